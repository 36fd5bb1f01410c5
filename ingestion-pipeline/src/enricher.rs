use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{
    error::{AppError, StageError},
    llm::{GenerateOptions, Generator},
    storage::{
        db::SurrealDbClient,
        types::{
            content_entity_edge::EdgeType,
            entity::{EntitySource, EntityType},
            tag_alias::TagAlias,
        },
    },
    utils::normalize::find_near_match,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

const CONTENT_CHAR_CAP: usize = 10_000;
const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";
const PROMPT_TAG_CAP: usize = 50;
const PROMPT_TOPIC_CAP: usize = 20;
const TAG_DEDUP_DISTANCE: usize = 2;

static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());

/// An entity surfaced by URL detection or keyword matching before the LLM
/// stage runs. `existing_id` is set when the entity is already persisted.
#[derive(Debug, Clone)]
pub struct PreDetectedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub normalized_name: String,
    pub existing_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Value,
    pub source: EntitySource,
}

impl PreDetectedEntity {
    /// The id the LLM echoes back in `pre_detected_validations`.
    pub fn validation_key(&self) -> String {
        match &self.existing_id {
            Some(id) => format!("entity:{id}"),
            None => format!("entity:{}", self.normalized_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub entity_type: EntityType,
    pub name: String,
    pub confidence: String,
    pub edge_type: EdgeType,
    pub hierarchy: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreDetectedValidation {
    pub entity_id: String,
    pub edge_type: EdgeType,
    pub confirmed: bool,
}

/// Strictly validated output of the single enrichment call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnifiedResult {
    pub tags: Vec<String>,
    pub new_tags: Vec<String>,
    pub tier: String,
    pub tier_explanation: Vec<String>,
    pub quality_score: i64,
    pub score_explanation: Vec<String>,
    pub summary: String,
    pub topics: Vec<ExtractedEntity>,
    pub pre_detected_validations: Vec<PreDetectedValidation>,
    pub additional_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub processed_at: Option<String>,
}

/// A candidate tag remapped onto an existing one during dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRemap {
    pub variant: String,
    pub canonical: String,
}

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub enabled: bool,
    pub max_new_tags: usize,
    pub max_topics_per_content: usize,
    pub min_confidence: f32,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_new_tags: 3,
            max_topics_per_content: 7,
            min_confidence: 0.6,
        }
    }
}

/// Single-LLM-call stage producing tags, quality rating, summary, topics,
/// validations of pre-detected entities, and additional entities.
pub struct UnifiedEnricher {
    generator: Arc<dyn Generator>,
    config: EnricherConfig,
}

impl UnifiedEnricher {
    pub fn new(generator: Arc<dyn Generator>, config: EnricherConfig) -> Self {
        Self { generator, config }
    }

    /// Run enrichment for one content. Returns `None` when the unified
    /// pipeline is disabled. Stage failures surface as `StageError` with
    /// `tag_fetch`, `llm_call`, or `parse` tags.
    #[allow(clippy::too_many_arguments)]
    pub async fn process(
        &self,
        content_id: &str,
        content_text: &str,
        content_type: &str,
        title: &str,
        pre_detected: &[PreDetectedEntity],
        existing_topics: &[String],
        job_id: Option<&str>,
        db: &SurrealDbClient,
    ) -> Result<Option<UnifiedResult>, AppError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let truncated = truncate_content(content_text);

        let stage_start = Instant::now();
        let existing_tags: Vec<String> =
            common::storage::types::content::Content::tag_counts(db)
                .await
                .map_err(|e| StageError::new("tag_fetch", "TAG_FETCH_ERROR", e.to_string()))?
                .into_iter()
                .map(|(name, _)| name)
                .collect();
        info!(
            job_id = job_id.unwrap_or("-"),
            content_id,
            ms = stage_start.elapsed().as_millis() as u64,
            tags = existing_tags.len(),
            "stage.tag_fetch"
        );

        let prompt = build_prompt(
            content_type,
            title,
            &existing_tags,
            pre_detected,
            existing_topics,
            self.config.max_new_tags,
            &truncated,
        );

        let stage_start = Instant::now();
        let response = self
            .generator
            .generate(
                &prompt,
                GenerateOptions {
                    temperature: 0.3,
                    max_tokens: 3000,
                    timeout: Duration::from_secs(120),
                },
            )
            .await
            .map_err(|e| StageError::new("llm_call", "LLM_CALL_ERROR", e.to_string()))?;
        info!(
            job_id = job_id.unwrap_or("-"),
            content_id,
            ms = stage_start.elapsed().as_millis() as u64,
            token_est = (prompt.len() + response.len()) / 4,
            "stage.llm_call"
        );

        let stage_start = Instant::now();
        let data = extract_json(&response).ok_or_else(|| {
            StageError::new(
                "parse",
                "EMPTY_RESPONSE",
                format!("Empty unified pipeline response for {content_id}"),
            )
        })?;

        let (mut result, remaps) = parse_unified_response(&data, &existing_tags, &self.config)
            .ok_or_else(|| {
                StageError::new(
                    "parse",
                    "PARSE_FAILED",
                    format!("Failed to parse unified response for {content_id}"),
                )
            })?;
        info!(
            job_id = job_id.unwrap_or("-"),
            content_id,
            ms = stage_start.elapsed().as_millis() as u64,
            "stage.parse"
        );

        for remap in remaps {
            if let Err(e) = TagAlias::record(&remap.variant, &remap.canonical, db).await {
                warn!(variant = %remap.variant, canonical = %remap.canonical, error = %e, "failed to record tag alias");
            }
        }

        result.model = self.generator.model_name().to_owned();
        result.processed_at = Some(Utc::now().to_rfc3339());

        info!(
            job_id = job_id.unwrap_or("-"),
            content_id,
            tier = %result.tier,
            score = result.quality_score,
            topics = result.topics.len(),
            "pipeline.complete"
        );

        Ok(Some(result))
    }
}

fn truncate_content(text: &str) -> String {
    if text.chars().count() <= CONTENT_CHAR_CAP {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(CONTENT_CHAR_CAP).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

fn build_prompt(
    content_type: &str,
    title: &str,
    existing_tags: &[String],
    pre_detected: &[PreDetectedEntity],
    existing_topics: &[String],
    max_new_tags: usize,
    content_text: &str,
) -> String {
    let tags_line = if existing_tags.is_empty() {
        "None yet".to_owned()
    } else {
        existing_tags
            .iter()
            .take(PROMPT_TAG_CAP)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let topics_line = if existing_topics.is_empty() {
        "None yet".to_owned()
    } else {
        existing_topics
            .iter()
            .take(PROMPT_TOPIC_CAP)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let pre_detected_json = serde_json::to_string_pretty(
        &pre_detected
            .iter()
            .map(|e| {
                serde_json::json!({
                    "entity_id": e.validation_key(),
                    "type": e.entity_type.as_str(),
                    "name": e.name,
                })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_owned());

    format!(
        r#"You are a content analyst. Evaluate the content and provide classification ratings, tags, and entity extraction in a single response.

CONTENT TYPE: {content_type}
CONTENT TITLE: {title}

## EXISTING TAGS (prefer these over creating new ones)
{tags_line}

## PRE-DETECTED ENTITIES (already found via URL/keyword matching)
{pre_detected_json}

## EXISTING TOPICS (strongly prefer these)
{topics_line}

## RULES

### Tags
- Assign up to 10 tags from existing tags above
- You may create up to {max_new_tags} NEW tags if needed (lowercase, hyphenated)
- Tags must be single lowercase words or hyphenated (e.g. "kubernetes", "home-lab")

### Quality Rating
- Assign a quality tier: S (exceptional), A (great), B (good), C (mediocre), D (poor)
- Assign a quality score from 1-100 where 50 = average, 80+ = exceptional, <30 = low value
- Provide brief explanations (2-3 bullet points each)

### Summary
- Generate a summary: a 2-3 sentence overview followed by 3-5 bullet points of main topics

### Topics
- Extract 3-7 hierarchical topics
- Format: "Parent > Child > Grandchild" (e.g., "AI > LLMs > RAG")
- PREFER existing topics over creating new ones

### Pre-detected Validations
- For each pre-detected entity, confirm edge_type: discusses, mentions, uses, cites, demonstrates

### Additional Entities
- Only extract repos/tools/papers NOT in the pre-detected list
- Must be substantively discussed, not just name-dropped

<CONTENT>
{content_text}
</CONTENT>

Respond ONLY with valid JSON (no markdown, no code blocks):
{{
  "tags": ["existing-tag-1", "existing-tag-2"],
  "new_tags": ["genuinely-new-tag"],
  "tier": "B",
  "tier_explanation": ["Reason 1", "Reason 2"],
  "quality_score": 55,
  "score_explanation": ["Reason 1", "Reason 2"],
  "summary": "2-3 sentence overview.\n\n- Bullet 1\n- Bullet 2",
  "topics": [
    {{"name": "AI > LLMs > RAG", "confidence": "high", "edge_type": "discusses"}}
  ],
  "pre_detected_validations": [
    {{"entity_id": "entity:langchain", "edge_type": "uses", "confirmed": true}}
  ],
  "additional_entities": [
    {{"type": "repo", "name": "FAISS", "confidence": "medium", "edge_type": "mentions"}}
  ]
}}"#
    )
}

/// Parse an LLM response body into JSON, tolerating markdown fences.
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim_start_matches(['\r', '\n'])
            .trim_end_matches('`')
            .trim()
    } else {
        trimmed
    };

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }

    // Last resort: the widest brace-delimited slice.
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&candidate[start..=end]).ok()
}

fn confidence_to_float(confidence: &str) -> f32 {
    match confidence.to_lowercase().as_str() {
        "high" => 0.9,
        "medium" => 0.7,
        "low" => 0.5,
        _ => 0.6,
    }
}

fn parse_topic_hierarchy(topic: &str) -> Vec<String> {
    topic
        .split('>')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

const RECOGNIZED_FIELDS: &[&str] = &[
    "tags",
    "new_tags",
    "tier",
    "quality_score",
    "topics",
    "pre_detected_validations",
    "additional_entities",
    "summary",
];

/// Validate the raw JSON into a `UnifiedResult`. Returns `None` when the
/// payload has none of the recognized fields.
pub fn parse_unified_response(
    data: &Value,
    existing_tags: &[String],
    config: &EnricherConfig,
) -> Option<(UnifiedResult, Vec<TagRemap>)> {
    let object = data.as_object()?;
    if !RECOGNIZED_FIELDS.iter().any(|field| object.contains_key(*field)) {
        return None;
    }

    // Tier snaps to C on anything outside the scale.
    let tier = data
        .get("tier")
        .and_then(|v| v.as_str())
        .map(str::to_uppercase)
        .filter(|t| matches!(t.as_str(), "S" | "A" | "B" | "C" | "D"))
        .unwrap_or_else(|| "C".to_owned());

    let quality_score = match data.get("quality_score") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(50),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(50),
        _ => 50,
    }
    .clamp(1, 100);

    let mut tags: Vec<String> = string_list(data.get("tags"))
        .into_iter()
        .filter(|t| LABEL_PATTERN.is_match(t))
        .collect();

    let mut new_tags = Vec::new();
    let mut remaps = Vec::new();
    let mut new_count = 0;
    for candidate in string_list(data.get("new_tags")) {
        if new_count >= config.max_new_tags {
            break;
        }
        if !LABEL_PATTERN.is_match(&candidate) {
            continue;
        }

        let known: Vec<&str> = existing_tags
            .iter()
            .map(String::as_str)
            .chain(tags.iter().map(String::as_str))
            .collect();
        if let Some(matched) = find_near_match(&candidate, known, TAG_DEDUP_DISTANCE) {
            let matched = matched.to_owned();
            if candidate != matched {
                remaps.push(TagRemap {
                    variant: candidate,
                    canonical: matched.clone(),
                });
            }
            if !tags.contains(&matched) {
                tags.push(matched);
            }
        } else if !tags.contains(&candidate) {
            tags.push(candidate.clone());
            new_tags.push(candidate);
            new_count += 1;
        }
    }

    let mut topics = Vec::new();
    if let Some(raw_topics) = data.get("topics").and_then(|v| v.as_array()) {
        for topic in raw_topics {
            if topics.len() >= config.max_topics_per_content {
                break;
            }
            let Some(name) = topic.get("name").and_then(|v| v.as_str()).filter(|n| !n.is_empty())
            else {
                continue;
            };
            let confidence = topic
                .get("confidence")
                .and_then(|v| v.as_str())
                .unwrap_or("medium");
            if confidence_to_float(confidence) < config.min_confidence {
                continue;
            }

            let hierarchy = parse_topic_hierarchy(name);
            let edge_type = topic
                .get("edge_type")
                .and_then(|v| v.as_str())
                .unwrap_or("discusses");

            topics.push(ExtractedEntity {
                entity_type: EntityType::Topic,
                name: hierarchy.last().cloned().unwrap_or_else(|| name.to_owned()),
                confidence: confidence.to_owned(),
                edge_type: EdgeType::parse_or_mentions(edge_type),
                hierarchy: Some(hierarchy),
            });
        }
    }

    let mut validations = Vec::new();
    if let Some(raw) = data.get("pre_detected_validations").and_then(|v| v.as_array()) {
        for validation in raw {
            let Some(entity_id) = validation
                .get("entity_id")
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
            else {
                continue;
            };
            validations.push(PreDetectedValidation {
                entity_id: entity_id.to_owned(),
                edge_type: EdgeType::parse_or_mentions(
                    validation
                        .get("edge_type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("mentions"),
                ),
                confirmed: validation
                    .get("confirmed")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            });
        }
    }

    let mut additional = Vec::new();
    if let Some(raw) = data.get("additional_entities").and_then(|v| v.as_array()) {
        for entity in raw {
            let Some(name) = entity.get("name").and_then(|v| v.as_str()).filter(|n| !n.is_empty())
            else {
                continue;
            };
            let confidence = entity
                .get("confidence")
                .and_then(|v| v.as_str())
                .unwrap_or("medium");
            if confidence_to_float(confidence) < config.min_confidence {
                continue;
            }

            let entity_type = entity
                .get("type")
                .and_then(|v| v.as_str())
                .and_then(EntityType::parse)
                .unwrap_or(EntityType::Topic);

            additional.push(ExtractedEntity {
                entity_type,
                name: name.to_owned(),
                confidence: confidence.to_owned(),
                edge_type: EdgeType::parse_or_mentions(
                    entity.get("edge_type").and_then(|v| v.as_str()).unwrap_or("mentions"),
                ),
                hierarchy: None,
            });
        }
    }

    let result = UnifiedResult {
        tags,
        new_tags,
        tier,
        tier_explanation: string_list(data.get("tier_explanation")),
        quality_score,
        score_explanation: string_list(data.get("score_explanation")),
        summary: data
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned(),
        topics,
        pre_detected_validations: validations,
        additional_entities: additional,
        model: String::new(),
        processed_at: None,
    };

    Some((result, remaps))
}
