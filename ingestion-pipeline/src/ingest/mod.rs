pub mod web;
pub mod youtube;

use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        blob::BlobStore,
        db::SurrealDbClient,
        types::{
            chunk::Chunk,
            content::Content,
            content_entity_edge::ContentEntityEdge,
            content_link::ContentLink,
        },
    },
    utils::urls::{canonicalize_web_url, classify_url, web_resource_key, youtube_resource_key, UrlKind},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::fetchers::youtube::YoutubeFetcher;
use crate::orchestrator::JobOrchestrator;

/// Result of an ingest request. `job_id` is `None` when the record already
/// existed or the pipeline is disabled.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub content_id: String,
    pub content_type: String,
    pub title: String,
    pub job_id: Option<String>,
}

/// Entry point for URL and document ingestion: classify, dedup, fetch,
/// store bytes, create the content record, submit a pipeline job.
pub struct Ingestor {
    db: Arc<SurrealDbClient>,
    blob: BlobStore,
    orchestrator: Arc<JobOrchestrator>,
    youtube: Arc<YoutubeFetcher>,
    http: reqwest::Client,
}

impl Ingestor {
    pub fn new(
        db: Arc<SurrealDbClient>,
        blob: BlobStore,
        orchestrator: Arc<JobOrchestrator>,
        youtube: Arc<YoutubeFetcher>,
    ) -> Self {
        Self {
            db,
            blob,
            orchestrator,
            youtube,
            http: reqwest::Client::new(),
        }
    }

    pub async fn ingest_url(&self, url: &str, caller: &str) -> Result<IngestOutcome, AppError> {
        let detected = classify_url(url);
        match detected.kind {
            UrlKind::Youtube => self.ingest_youtube(&detected.extracted_id, caller).await,
            _ => self.ingest_web(url, caller).await,
        }
    }

    async fn ingest_youtube(&self, video_id: &str, caller: &str) -> Result<IngestOutcome, AppError> {
        let resource_key = youtube_resource_key(video_id);
        let existing = Content::find_by_resource_key(&resource_key, &self.db).await?;

        if let Some(existing) = existing {
            if !youtube::has_incomplete_metadata(&existing, video_id) {
                return Ok(IngestOutcome {
                    content_id: existing.id,
                    content_type: existing.content_type,
                    title: existing.title,
                    job_id: None,
                });
            }
            return self.backfill_youtube(video_id, existing).await;
        }

        // New video: the transcript is the payload, so its fetch is fatal.
        let transcript = self.youtube.fetch_transcript(video_id).await?;
        let file_path = youtube::transcript_path(video_id);
        let file_size = self
            .blob
            .put(&file_path, Bytes::from(transcript.timestamped_text.clone()))
            .await? as u64;

        // Metadata fetch failures degrade to a placeholder title.
        let fetched = match self.youtube.fetch_metadata(video_id).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(video_id, error = %e, "failed to fetch YouTube metadata");
                None
            }
        };

        let title = fetched
            .as_ref()
            .map_or_else(|| youtube::placeholder_title(video_id), |m| m.title.clone());
        let tags = fetched.as_ref().map_or_else(Vec::new, |m| m.tags.clone());

        let content = Content::new(
            "youtube".into(),
            title.clone(),
            "text/plain".into(),
            file_size,
            file_path,
            caller.to_owned(),
            tags,
            youtube::content_metadata(video_id, &resource_key, Some(&transcript), fetched.as_ref()),
        );
        let content_id = content.id.clone();
        let created_at = content.created_at;
        self.db.store_item(content).await?;

        let document = youtube::blob_metadata_document(
            &content_id,
            video_id,
            &title,
            fetched.as_ref(),
            &transcript.language,
            transcript.segments.len(),
            transcript.full_text.chars().count(),
            file_size,
            caller,
            Some(created_at.to_rfc3339()),
        );
        self.blob
            .put(
                &youtube::metadata_path(video_id),
                Bytes::from(serde_json::to_vec_pretty(&document).unwrap_or_default()),
            )
            .await?;

        let job = self
            .orchestrator
            .submit(
                &content_id,
                &transcript.full_text,
                "youtube",
                &title,
                &resource_key,
            )
            .await?;

        info!(video_id, content_id, "ingested new YouTube video");

        Ok(IngestOutcome {
            content_id,
            content_type: "youtube".into(),
            title,
            job_id: job.map(|j| j.id),
        })
    }

    /// Re-fetch Data API metadata for a record that was ingested while the
    /// metadata API was down. Never submits a job; failures return the
    /// record unchanged.
    async fn backfill_youtube(
        &self,
        video_id: &str,
        existing: Content,
    ) -> Result<IngestOutcome, AppError> {
        info!(video_id, content_id = %existing.id, "backfilling YouTube metadata");

        let fetched = match self.youtube.fetch_metadata(video_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(video_id, error = %e, "backfill metadata fetch failed");
                return Ok(IngestOutcome {
                    content_id: existing.id,
                    content_type: existing.content_type,
                    title: existing.title,
                    job_id: None,
                });
            }
        };

        let mut metadata = existing.metadata.clone();
        if !metadata.is_object() {
            metadata = serde_json::json!({});
        }
        metadata["published_at"] = serde_json::json!(fetched.published_at);
        metadata["fetched_at"] = serde_json::json!(fetched.fetched_at);
        metadata["channel_id"] = serde_json::json!(fetched.channel_id);
        metadata["channel_title"] = serde_json::json!(fetched.channel_title);
        metadata["duration_seconds"] = serde_json::json!(fetched.duration_seconds);
        metadata["view_count"] = serde_json::json!(fetched.view_count);
        metadata["like_count"] = serde_json::json!(fetched.like_count);
        metadata["description_urls"] = serde_json::json!(fetched.description_urls);

        if let Err(e) = Content::backfill_metadata(
            &existing.id,
            &fetched.title,
            fetched.tags.clone(),
            metadata.clone(),
            &self.db,
        )
        .await
        {
            warn!(video_id, error = %e, "backfill record update failed");
            return Ok(IngestOutcome {
                content_id: existing.id,
                content_type: existing.content_type,
                title: existing.title,
                job_id: None,
            });
        }

        // Rewrite metadata.json; the database is the source of truth, so a
        // blob failure is only logged.
        let transcript_length = match self.blob.get(&existing.file_path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).chars().count(),
            Err(e) => {
                warn!(video_id, error = %e, "failed to read transcript for metadata.json");
                0
            }
        };
        let language = metadata
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("en")
            .to_owned();
        let segment_count = metadata
            .get("segment_count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as usize;

        let document = youtube::blob_metadata_document(
            &existing.id,
            video_id,
            &fetched.title,
            Some(&fetched),
            &language,
            segment_count,
            transcript_length,
            existing.file_size,
            &existing.author,
            Some(existing.created_at.to_rfc3339()),
        );
        if let Err(e) = self
            .blob
            .put(
                &youtube::metadata_path(video_id),
                Bytes::from(serde_json::to_vec_pretty(&document).unwrap_or_default()),
            )
            .await
        {
            warn!(video_id, error = %e, "failed to rewrite metadata.json");
        }

        Ok(IngestOutcome {
            content_id: existing.id,
            content_type: "youtube".into(),
            title: fetched.title,
            job_id: None,
        })
    }

    async fn ingest_web(&self, url: &str, caller: &str) -> Result<IngestOutcome, AppError> {
        let canonical_url = canonicalize_web_url(url)
            .map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
        let resource_key = web_resource_key(&canonical_url);

        if let Some(existing) = Content::find_by_resource_key(&resource_key, &self.db).await? {
            return Ok(IngestOutcome {
                content_id: existing.id,
                content_type: existing.content_type,
                title: existing.title,
                job_id: None,
            });
        }

        let page = web::extract_page(&self.http, url).await?;

        let url_hash = resource_key.trim_start_matches("url:");
        let file_path = format!("web/{url_hash}/content.md");
        let file_size = self
            .blob
            .put(&file_path, Bytes::from(page.markdown.clone()))
            .await? as u64;

        let title = if page.title.is_empty() {
            canonical_url.clone()
        } else {
            page.title.clone()
        };

        let content = Content::new(
            "web".into(),
            title.clone(),
            "text/markdown".into(),
            file_size,
            file_path,
            caller.to_owned(),
            vec![],
            serde_json::json!({
                "source_url": url,
                "canonical_url": canonical_url,
                "resource_key": resource_key,
            }),
        );
        let content_id = content.id.clone();
        self.db.store_item(content).await?;

        let job = self
            .orchestrator
            .submit(&content_id, &page.markdown, "web", &title, &resource_key)
            .await?;

        info!(%canonical_url, content_id, "ingested web page");

        Ok(IngestOutcome {
            content_id,
            content_type: "web".into(),
            title,
            job_id: job.map(|j| j.id),
        })
    }

    /// Store an uploaded document and submit it for processing when its
    /// body is valid UTF-8.
    pub async fn ingest_document(
        &self,
        filename: &str,
        data: Bytes,
        mime_type: &str,
        caller: &str,
    ) -> Result<IngestOutcome, AppError> {
        let content_type = if mime_type == "text/markdown" || filename.ends_with(".md") {
            "markdown"
        } else {
            "document"
        };

        let content = Content::new(
            content_type.into(),
            filename.to_owned(),
            mime_type.to_owned(),
            data.len() as u64,
            String::new(),
            caller.to_owned(),
            vec![],
            serde_json::json!({ "resource_key": format!("doc:{}", uuid::Uuid::new_v4()) }),
        );
        let content_id = content.id.clone();
        let file_path = format!("{content_type}/{content_id}/{filename}");
        let resource_key = content.resource_key().unwrap_or_default().to_owned();

        let mut content = content;
        content.file_path = file_path.clone();
        self.blob.put(&file_path, data.clone()).await?;
        self.db.store_item(content).await?;

        let job = match std::str::from_utf8(&data) {
            Ok(text) => {
                self.orchestrator
                    .submit(&content_id, text, content_type, filename, &resource_key)
                    .await?
            }
            Err(_) => None,
        };

        Ok(IngestOutcome {
            content_id,
            content_type: content_type.into(),
            title: filename.to_owned(),
            job_id: job.map(|j| j.id),
        })
    }

    /// Delete a content record and everything hanging off it: chunks,
    /// edges, links, and stored payloads.
    pub async fn delete_content(&self, content_id: &str) -> Result<(), AppError> {
        let Some(content) = self.db.get_item::<Content>(content_id).await? else {
            return Err(AppError::NotFound(format!("content {content_id}")));
        };

        Chunk::delete_by_content(content_id, &self.db).await?;
        ContentEntityEdge::delete_by_content(content_id, &self.db).await?;
        ContentLink::delete_touching(content_id, &self.db).await?;

        if !content.file_path.is_empty() {
            let prefix = content
                .file_path
                .rsplit_once('/')
                .map_or(content.file_path.as_str(), |(dir, _)| dir);
            if let Err(e) = self.blob.delete_prefix(prefix).await {
                warn!(content_id, error = %e, "failed to delete blobs");
            }
        }

        self.db.delete_item::<Content>(content_id).await?;
        Ok(())
    }
}
