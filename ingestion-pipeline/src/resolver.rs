use std::collections::HashMap;
use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            content::{Content, ProcessingStatus},
            content_entity_edge::{ContentEntityEdge, EdgeType},
            entity::{Entity, EntitySource, EntityType, NewEntity},
        },
    },
    utils::{
        keyword_matcher::KeywordMatcher,
        normalize::normalize_name,
        sponsored::SponsoredFilter,
        urls::{detect_urls, DetectedUrl, UrlKind},
    },
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::enricher::{PreDetectedEntity, UnifiedEnricher, UnifiedResult};
use crate::fetchers::{
    arxiv::ArxivFetcher, github::GithubFetcher, semantic_scholar::SemanticScholarFetcher,
};

const EXISTING_TOPIC_CAP: usize = 50;

/// The optional external clients stage 1 can enrich detections with.
#[derive(Default)]
pub struct ResolverFetchers {
    pub github: Option<Arc<GithubFetcher>>,
    pub arxiv: Option<Arc<ArxivFetcher>>,
    pub scholar: Option<Arc<SemanticScholarFetcher>>,
}

/// Outcome of a full resolution run, for job bookkeeping and persistence.
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub result: UnifiedResult,
    pub edges_created: usize,
    pub entities_created: usize,
    pub entities_reused: usize,
}

/// Runs URL detection, keyword matching, and unified enrichment, then
/// upserts entities and writes content-entity edges.
pub struct EntityResolver {
    db: Arc<SurrealDbClient>,
    enricher: Arc<UnifiedEnricher>,
    matcher: Arc<RwLock<KeywordMatcher>>,
    sponsored: SponsoredFilter,
    fetchers: ResolverFetchers,
    fetch_external_metadata: bool,
}

impl EntityResolver {
    pub fn new(
        db: Arc<SurrealDbClient>,
        enricher: Arc<UnifiedEnricher>,
        matcher: Arc<RwLock<KeywordMatcher>>,
        fetchers: ResolverFetchers,
        fetch_external_metadata: bool,
    ) -> Self {
        Self {
            db,
            enricher,
            matcher,
            sponsored: SponsoredFilter::default(),
            fetchers,
            fetch_external_metadata,
        }
    }

    /// Rebuild the process-wide keyword index from the entity table.
    pub async fn refresh_matcher_cache(&self) -> Result<(), AppError> {
        let entities = Entity::list_all(&self.db).await?;
        let count = entities.len();
        self.matcher.write().await.load_entities(entities);
        info!(count, "loaded entities into keyword matcher cache");
        Ok(())
    }

    /// Process one content through the full resolution pipeline. Returns
    /// `None` when the unified pipeline is disabled.
    pub async fn process_content(
        &self,
        content_id: &str,
        content_text: &str,
        content_type: &str,
        title: &str,
        description_urls: &[String],
        job_id: Option<&str>,
    ) -> Result<Option<ResolutionOutcome>, AppError> {
        // Stage 1: URL detection over body text and curated description links.
        let mut pre_detected = self
            .detect_url_entities(content_text, description_urls)
            .await;

        // Stage 2: keyword/alias matches against the cached entity index.
        {
            let matcher = self.matcher.read().await;
            for matched in matcher.find_in_text(content_text) {
                let already_known = pre_detected
                    .iter()
                    .any(|p| p.existing_id.as_deref() == Some(matched.entity.id.as_str()));
                if already_known {
                    continue;
                }
                pre_detected.push(PreDetectedEntity {
                    name: matched.entity.name.clone(),
                    entity_type: matched.entity.entity_type,
                    normalized_name: matched.entity.normalized_name.clone(),
                    existing_id: Some(matched.entity.id.clone()),
                    description: matched.entity.description.clone(),
                    metadata: matched.entity.metadata.clone(),
                    source: matched.entity.source,
                });
            }
        }

        // Stage 3: the single enrichment call.
        let existing_topics: Vec<String> = Entity::topic_hierarchy(&self.db)
            .await?
            .into_iter()
            .take(EXISTING_TOPIC_CAP)
            .map(|t| t.name)
            .collect();

        let Some(result) = self
            .enricher
            .process(
                content_id,
                content_text,
                content_type,
                title,
                &pre_detected,
                &existing_topics,
                job_id,
                &self.db,
            )
            .await?
        else {
            return Ok(None);
        };

        // Stage 4: resolve and persist.
        let mut edges_created = 0;
        let mut entities_created = 0;
        let mut entities_reused = 0;

        let validation_map: HashMap<&str, _> = result
            .pre_detected_validations
            .iter()
            .map(|v| (v.entity_id.as_str(), v))
            .collect();

        for pre in &pre_detected {
            let key = pre.validation_key();
            let validation = validation_map.get(key.as_str());
            if validation.is_some_and(|v| !v.confirmed) {
                continue;
            }
            let edge_type = validation.map_or(EdgeType::Mentions, |v| v.edge_type);

            let (entity, created) = Entity::find_or_create(
                &pre.name,
                pre.entity_type,
                NewEntity {
                    description: pre.description.clone(),
                    hierarchy: Vec::new(),
                    metadata: pre.metadata.clone(),
                    source: pre.source,
                },
                &self.db,
            )
            .await?;
            if created {
                entities_created += 1;
            } else {
                entities_reused += 1;
            }

            let edge_source = if pre.source == EntitySource::UrlDetected {
                EntitySource::UrlDetected
            } else {
                EntitySource::AiExtracted
            };
            if self
                .write_edge(content_id, &entity, edge_type, 0.9, edge_source)
                .await
            {
                edges_created += 1;
            }
        }

        for topic in &result.topics {
            let (entity, created) = self
                .resolve_topic(&topic.name, topic.hierarchy.as_deref())
                .await?;
            if created {
                entities_created += 1;
            } else {
                entities_reused += 1;
            }
            if self
                .write_edge(
                    content_id,
                    &entity,
                    topic.edge_type,
                    0.85,
                    EntitySource::AiExtracted,
                )
                .await
            {
                edges_created += 1;
            }
        }

        for extra in &result.additional_entities {
            let (entity, created) = Entity::find_or_create(
                &extra.name,
                extra.entity_type,
                NewEntity {
                    source: EntitySource::AiExtracted,
                    ..Default::default()
                },
                &self.db,
            )
            .await?;
            if created {
                entities_created += 1;
            } else {
                entities_reused += 1;
            }
            if self
                .write_edge(
                    content_id,
                    &entity,
                    extra.edge_type,
                    0.7,
                    EntitySource::AiExtracted,
                )
                .await
            {
                edges_created += 1;
            }
        }

        Content::set_processing_status(content_id, ProcessingStatus::Completed, &self.db).await?;

        info!(
            content_id,
            edges_created, entities_created, entities_reused, "entity resolution finished"
        );

        Ok(Some(ResolutionOutcome {
            result,
            edges_created,
            entities_created,
            entities_reused,
        }))
    }

    async fn write_edge(
        &self,
        content_id: &str,
        entity: &Entity,
        edge_type: EdgeType,
        confidence: f32,
        source: EntitySource,
    ) -> bool {
        let edge = ContentEntityEdge::new(
            content_id.to_owned(),
            entity.id.clone(),
            edge_type,
            confidence,
            source,
        );
        match edge.create(&self.db).await {
            Ok(_) => true,
            Err(e) => {
                // Duplicate pairs and transient store errors are both
                // non-fatal; the pipeline completes without the edge.
                warn!(entity = %entity.name, error = %e, "failed to create edge");
                false
            }
        }
    }

    async fn detect_url_entities(
        &self,
        content_text: &str,
        description_urls: &[String],
    ) -> Vec<PreDetectedEntity> {
        let mut combined = content_text.to_owned();
        for url in description_urls {
            combined.push('\n');
            combined.push_str(url);
        }

        let mut entities = Vec::new();
        for detected in detect_urls(&combined) {
            if self
                .sponsored
                .is_sponsored_link(&detected.url, Some(content_text))
            {
                continue;
            }
            if let Some(entity) = self.url_to_entity(&detected).await {
                push_unique(&mut entities, entity);
            }
        }

        // Description links are author-curated; surviving plain-web links
        // are promoted to tool candidates for the enricher to validate.
        for raw in description_urls {
            if common::utils::urls::classify_url(raw).kind != UrlKind::Web {
                continue;
            }
            if self.sponsored.is_sponsored_link(raw, Some(content_text)) {
                continue;
            }
            if let Some(entity) = web_link_entity(raw) {
                push_unique(&mut entities, entity);
            }
        }

        entities
    }

    async fn url_to_entity(&self, detected: &DetectedUrl) -> Option<PreDetectedEntity> {
        match detected.kind {
            UrlKind::GithubRepo => Some(self.resolve_github_repo(detected).await),
            UrlKind::Arxiv => Some(self.resolve_arxiv_paper(detected).await),
            UrlKind::Doi => Some(self.resolve_doi_paper(detected).await),
            UrlKind::Pypi => Some(registry_tool_entity(detected, "pypi")),
            UrlKind::Npm => Some(registry_tool_entity(detected, "npm")),
            _ => None,
        }
    }

    async fn resolve_github_repo(&self, detected: &DetectedUrl) -> PreDetectedEntity {
        let (owner, repo) = detected
            .extracted_id
            .split_once('/')
            .unwrap_or(("", detected.extracted_id.as_str()));
        let mut name = repo.to_owned();
        let mut description = None;
        let mut metadata = serde_json::json!({ "url": detected.url, "owner": owner });

        if self.fetch_external_metadata {
            if let Some(fetcher) = &self.fetchers.github {
                match fetcher.fetch_repo(owner, repo).await {
                    Ok(Some(info)) => {
                        metadata["stars"] = serde_json::json!(info.stars);
                        metadata["language"] = serde_json::json!(info.language);
                        metadata["topics"] = serde_json::json!(info.topics);
                        metadata["fetched_at"] = serde_json::json!(info.fetched_at.to_rfc3339());
                        if info.description.is_some() {
                            description = info.description;
                            name = info.name;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(repo = %detected.extracted_id, error = %e, "failed to fetch GitHub metadata");
                    }
                }
            }
        }

        PreDetectedEntity {
            normalized_name: normalize_name(&name),
            name,
            entity_type: EntityType::Repo,
            existing_id: None,
            description,
            metadata,
            source: EntitySource::UrlDetected,
        }
    }

    async fn resolve_arxiv_paper(&self, detected: &DetectedUrl) -> PreDetectedEntity {
        let arxiv_id = &detected.extracted_id;
        let mut name = format!("arXiv:{arxiv_id}");
        let mut description = None;
        let mut metadata = serde_json::json!({ "url": detected.url, "arxiv_id": arxiv_id });

        if self.fetch_external_metadata {
            if let Some(fetcher) = &self.fetchers.arxiv {
                match fetcher.fetch_paper(arxiv_id).await {
                    Ok(Some(info)) => {
                        name = info.title;
                        metadata["authors"] = serde_json::json!(info.authors);
                        metadata["doi"] = serde_json::json!(info.doi);
                        metadata["published_at"] =
                            serde_json::json!(info.published_at.map(|d| d.to_rfc3339()));
                        metadata["fetched_at"] = serde_json::json!(info.fetched_at.to_rfc3339());
                        if let Some(abstract_text) = info.abstract_text {
                            metadata["abstract"] = serde_json::json!(abstract_text);
                            description = Some(abstract_text);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(%arxiv_id, error = %e, "failed to fetch arXiv metadata");
                    }
                }
            }
        }

        PreDetectedEntity {
            normalized_name: normalize_name(&name),
            name,
            entity_type: EntityType::Paper,
            existing_id: None,
            description,
            metadata,
            source: EntitySource::UrlDetected,
        }
    }

    async fn resolve_doi_paper(&self, detected: &DetectedUrl) -> PreDetectedEntity {
        let doi = &detected.extracted_id;
        let mut name = format!("doi:{doi}");
        let mut description = None;
        let mut metadata = serde_json::json!({ "url": detected.url, "doi": doi });

        if self.fetch_external_metadata {
            if let Some(fetcher) = &self.fetchers.scholar {
                match fetcher.fetch_paper(&format!("DOI:{doi}")).await {
                    Ok(Some(info)) => {
                        name = info.title;
                        metadata["authors"] = serde_json::json!(info.authors);
                        metadata["year"] = serde_json::json!(info.year);
                        metadata["citation_count"] = serde_json::json!(info.citation_count);
                        metadata["fetched_at"] = serde_json::json!(info.fetched_at.to_rfc3339());
                        if let Some(abstract_text) = info.abstract_text {
                            description = Some(abstract_text);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(%doi, error = %e, "failed to fetch Semantic Scholar metadata");
                    }
                }
            }
        }

        PreDetectedEntity {
            normalized_name: normalize_name(&name),
            name,
            entity_type: EntityType::Paper,
            existing_id: None,
            description,
            metadata,
            source: EntitySource::UrlDetected,
        }
    }

    /// Create parent topics for every hierarchy prefix, then the leaf with a
    /// `parent_topic` pointer.
    async fn resolve_topic(
        &self,
        name: &str,
        hierarchy: Option<&[String]>,
    ) -> Result<(Entity, bool), AppError> {
        let owned_hierarchy;
        let hierarchy: &[String] = match hierarchy {
            Some(h) if !h.is_empty() => h,
            _ => {
                owned_hierarchy = vec![name.to_owned()];
                &owned_hierarchy
            }
        };

        let mut parent_id: Option<String> = None;
        for (depth, level) in hierarchy[..hierarchy.len() - 1].iter().enumerate() {
            let (parent, _) = Entity::find_or_create(
                level,
                EntityType::Topic,
                NewEntity {
                    hierarchy: hierarchy[..=depth].to_vec(),
                    source: EntitySource::AiExtracted,
                    ..Default::default()
                },
                &self.db,
            )
            .await?;
            parent_id = Some(parent.id);
        }

        let leaf_name = hierarchy.last().map(String::as_str).unwrap_or(name);
        let metadata = match &parent_id {
            Some(id) => serde_json::json!({ "parent_topic": format!("entity:{id}") }),
            None => serde_json::json!({}),
        };

        Entity::find_or_create(
            leaf_name,
            EntityType::Topic,
            NewEntity {
                hierarchy: hierarchy.to_vec(),
                metadata,
                source: EntitySource::AiExtracted,
                ..Default::default()
            },
            &self.db,
        )
        .await
    }
}

fn push_unique(entities: &mut Vec<PreDetectedEntity>, entity: PreDetectedEntity) {
    let exists = entities.iter().any(|e| {
        e.entity_type == entity.entity_type && e.normalized_name == entity.normalized_name
    });
    if !exists {
        entities.push(entity);
    }
}

fn registry_tool_entity(detected: &DetectedUrl, registry: &str) -> PreDetectedEntity {
    PreDetectedEntity {
        name: detected.extracted_id.clone(),
        entity_type: EntityType::Tool,
        normalized_name: normalize_name(&detected.extracted_id),
        existing_id: None,
        description: None,
        metadata: serde_json::json!({ "url": detected.url, "registry": registry }),
        source: EntitySource::UrlDetected,
    }
}

/// A curated plain-web link becomes a tool candidate named after its host
/// and leading path segment.
fn web_link_entity(raw: &str) -> Option<PreDetectedEntity> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").to_owned();
    let first_segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next().map(str::to_owned))
        .filter(|s| !s.is_empty());

    let name = match first_segment {
        Some(segment) => format!("{host}/{segment}"),
        None => host,
    };

    Some(PreDetectedEntity {
        normalized_name: normalize_name(&name.replace('/', " ")),
        name,
        entity_type: EntityType::Tool,
        existing_id: None,
        description: None,
        metadata: serde_json::json!({ "url": raw }),
        source: EntitySource::UrlDetected,
    })
}
