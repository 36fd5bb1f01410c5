use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    None,
    Pending,
    Processing,
    Completed,
    Failed,
}

stored_object!(Content, "content", {
    content_type: String,
    title: String,
    mime_type: String,
    file_size: u64,
    file_path: String,
    author: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    processing_status: ProcessingStatus,
    #[serde(default)]
    pipeline_version: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    quality_score: Option<i64>,
    #[serde(default)]
    summary: Option<String>
});

/// Filters for content listing; `exclude_tags` defaults to `["test"]` so
/// fixture content stays out of browse views unless asked for.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub content_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub exclude_tags: Option<Vec<String>>,
    pub limit: usize,
    pub offset: usize,
}

/// One row of the version drift report.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriftGroup {
    pub version: String,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriftReport {
    pub current_version: String,
    pub stale_content: Vec<DriftGroup>,
    pub total_stale: usize,
    pub unknown_version_count: usize,
    pub total_content: usize,
}

impl Content {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content_type: String,
        title: String,
        mime_type: String,
        file_size: u64,
        file_path: String,
        author: String,
        tags: Vec<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content_type,
            title,
            mime_type,
            file_size,
            file_path,
            author,
            tags,
            description: None,
            metadata,
            processing_status: ProcessingStatus::None,
            pipeline_version: None,
            processed_at: None,
            tier: None,
            quality_score: None,
            summary: None,
        }
    }

    pub fn resource_key(&self) -> Option<&str> {
        self.metadata.get("resource_key").and_then(|v| v.as_str())
    }

    pub async fn find_by_resource_key(
        resource_key: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM content WHERE metadata.resource_key = $resource_key LIMIT 1")
            .bind(("resource_key", resource_key.to_owned()))
            .await?;
        Ok(response.take::<Vec<Self>>(0)?.into_iter().next())
    }

    pub async fn find_by_title(title: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM content WHERE title = $title LIMIT 1")
            .bind(("title", title.to_owned()))
            .await?;
        Ok(response.take::<Vec<Self>>(0)?.into_iter().next())
    }

    pub async fn list(filter: ContentFilter, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        // Searching for an excluded tag lifts it from the exclusion set.
        let mut exclude_tags = filter.exclude_tags.unwrap_or_else(|| vec!["test".to_owned()]);
        if let Some(tags) = &filter.tags {
            exclude_tags.retain(|tag| !tags.contains(tag));
        }

        let mut clauses = Vec::new();
        if filter.content_type.is_some() {
            clauses.push("content_type = $content_type");
        }
        if filter.tags.is_some() {
            clauses.push("tags CONTAINSANY $tags");
        }
        if !exclude_tags.is_empty() {
            clauses.push("tags CONTAINSNONE $exclude_tags");
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM content{where_clause} ORDER BY created_at DESC LIMIT $limit START $offset"
        );

        let mut query = db
            .query(sql)
            .bind(("limit", filter.limit.max(1)))
            .bind(("offset", filter.offset))
            .bind(("exclude_tags", exclude_tags));
        if let Some(content_type) = filter.content_type {
            query = query.bind(("content_type", content_type));
        }
        if let Some(tags) = filter.tags {
            query = query.bind(("tags", tags));
        }

        Ok(query.await?.take(0)?)
    }

    /// Update the caller-editable fields, leaving pipeline outputs alone.
    pub async fn patch_user_fields(
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        tags: Option<&[String]>,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut update = db
            .update(("content", id))
            .patch(PatchOp::replace("/updated_at", surrealdb::sql::Datetime::from(Utc::now())));
        if let Some(title) = title {
            update = update.patch(PatchOp::replace("/title", title.to_owned()));
        }
        if let Some(description) = description {
            update = update.patch(PatchOp::replace("/description", description.to_owned()));
        }
        if let Some(tags) = tags {
            update = update.patch(PatchOp::replace("/tags", tags.to_vec()));
        }
        Ok(update.await?)
    }

    pub async fn set_processing_status(
        id: &str,
        status: ProcessingStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update(("content", id))
            .patch(PatchOp::replace("/processing_status", status))
            .patch(PatchOp::replace("/updated_at", surrealdb::sql::Datetime::from(Utc::now())))
            .await?;
        Ok(())
    }

    /// Store the unified pipeline output: raw result document under
    /// `metadata.unified_result`, denormalized rating fields, completion
    /// bookkeeping.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_unified_result(
        id: &str,
        result: serde_json::Value,
        tags: Vec<String>,
        tier: &str,
        quality_score: i64,
        summary: &str,
        pipeline_version: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('content', $id) SET
                metadata.unified_result = $data,
                tags = $tags,
                tier = $tier,
                quality_score = $quality_score,
                summary = $summary,
                processing_status = 'completed',
                pipeline_version = $pipeline_version,
                processed_at = time::now(),
                updated_at = time::now()",
        )
        .bind(("id", id.to_owned()))
        .bind(("data", result))
        .bind(("tags", tags))
        .bind(("tier", tier.to_owned()))
        .bind(("quality_score", quality_score))
        .bind(("summary", summary.to_owned()))
        .bind(("pipeline_version", pipeline_version.to_owned()))
        .await?;
        Ok(())
    }

    /// Patch a YouTube record whose original metadata fetch failed.
    pub async fn backfill_metadata(
        id: &str,
        title: &str,
        tags: Vec<String>,
        metadata: serde_json::Value,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update(("content", id))
            .patch(PatchOp::replace("/title", title.to_owned()))
            .patch(PatchOp::replace("/tags", tags))
            .patch(PatchOp::replace("/metadata", metadata))
            .patch(PatchOp::replace("/updated_at", surrealdb::sql::Datetime::from(Utc::now())))
            .await?;
        Ok(())
    }

    /// All tags in use with their content counts, most used first, ties
    /// broken alphabetically.
    pub async fn tag_counts(db: &SurrealDbClient) -> Result<Vec<(String, usize)>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            tags: Vec<String>,
        }

        let mut response = db
            .query("SELECT tags FROM content WHERE tags != NONE AND array::len(tags) > 0")
            .await?;
        let rows: Vec<Row> = response.take(0)?;

        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for row in rows {
            for tag in row.tags {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(sorted)
    }

    /// Group completed content by pipeline version and report the stale part.
    pub async fn version_drift_report(
        current_version: &str,
        db: &SurrealDbClient,
    ) -> Result<DriftReport, AppError> {
        #[derive(Deserialize)]
        struct Row {
            pipeline_version: Option<String>,
            cnt: usize,
        }

        let mut response = db
            .query(
                "SELECT pipeline_version, count() AS cnt FROM content
                 WHERE processing_status = 'completed' GROUP BY pipeline_version",
            )
            .await?;
        let rows: Vec<Row> = response.take(0)?;

        let mut stale_content = Vec::new();
        let mut total_stale = 0;
        let mut unknown_version_count = 0;
        let mut total_content = 0;

        for row in rows {
            total_content += row.cnt;
            let Some(parsed) = row.pipeline_version.as_deref().and_then(parse_version_tuple) else {
                unknown_version_count += row.cnt;
                continue;
            };
            let current = parse_version_tuple(current_version);
            if current.is_some_and(|cur| parsed < cur) {
                stale_content.push(DriftGroup {
                    version: row.pipeline_version.unwrap_or_default(),
                    count: row.cnt,
                });
                total_stale += row.cnt;
            }
        }

        stale_content.sort_by(|a, b| b.count.cmp(&a.count).then(a.version.cmp(&b.version)));

        Ok(DriftReport {
            current_version: current_version.to_owned(),
            stale_content,
            total_stale,
            unknown_version_count,
            total_content,
        })
    }
}

/// Parse `x.y.z` into a comparable tuple; anything else is unknown.
pub fn parse_version_tuple(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SurrealDbClient {
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    fn sample_content(resource_key: &str) -> Content {
        Content::new(
            "web".into(),
            "Example".into(),
            "text/markdown".into(),
            42,
            "web/hash/content.md".into(),
            "caller-1".into(),
            vec![],
            serde_json::json!({ "resource_key": resource_key }),
        )
    }

    #[tokio::test]
    async fn test_find_by_resource_key() {
        let db = memory_db().await;
        let content = sample_content("url:abc");
        db.store_item(content.clone()).await.expect("store");

        let found = Content::find_by_resource_key("url:abc", &db)
            .await
            .expect("query");
        assert_eq!(found.map(|c| c.id), Some(content.id));

        let missing = Content::find_by_resource_key("url:other", &db)
            .await
            .expect("query");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_patch_user_fields() {
        let db = memory_db().await;
        let content = sample_content("url:abc");
        db.store_item(content.clone()).await.expect("store");

        let tags = vec!["rust".to_owned(), "async".to_owned()];
        Content::patch_user_fields(&content.id, Some("New title"), None, Some(&tags), &db)
            .await
            .expect("patch");

        let updated: Content = db.get_item(&content.id).await.expect("get").expect("some");
        assert_eq!(updated.title, "New title");
        assert_eq!(updated.tags, tags);
        assert!(updated.description.is_none());
    }

    #[tokio::test]
    async fn test_apply_unified_result_denormalizes() {
        let db = memory_db().await;
        let content = sample_content("yt:abc12345678");
        db.store_item(content.clone()).await.expect("store");

        Content::apply_unified_result(
            &content.id,
            serde_json::json!({ "tier": "A" }),
            vec!["programming".into()],
            "A",
            78,
            "A summary.",
            "1.2.0",
            &db,
        )
        .await
        .expect("apply");

        let updated: Content = db.get_item(&content.id).await.expect("get").expect("some");
        assert_eq!(updated.processing_status, ProcessingStatus::Completed);
        assert_eq!(updated.tier.as_deref(), Some("A"));
        assert_eq!(updated.quality_score, Some(78));
        assert_eq!(updated.summary.as_deref(), Some("A summary."));
        assert_eq!(updated.pipeline_version.as_deref(), Some("1.2.0"));
        assert!(updated.processed_at.is_some());
        assert_eq!(updated.metadata["unified_result"]["tier"], "A");
    }

    #[tokio::test]
    async fn test_list_excludes_test_tag_by_default() {
        let db = memory_db().await;
        let mut fixture = sample_content("url:one");
        fixture.tags = vec!["test".to_owned()];
        let mut regular = sample_content("url:two");
        regular.tags = vec!["rust".to_owned()];
        db.store_item(fixture).await.expect("store fixture");
        db.store_item(regular.clone()).await.expect("store regular");

        let listed = Content::list(
            ContentFilter {
                limit: 10,
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, regular.id);

        // Asking for the excluded tag lifts the exclusion.
        let fixtures = Content::list(
            ContentFilter {
                tags: Some(vec!["test".to_owned()]),
                limit: 10,
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("list test");
        assert_eq!(fixtures.len(), 1);
    }

    #[tokio::test]
    async fn test_version_drift_report() {
        let db = memory_db().await;
        for (key, version) in [("url:a", "1.0.0"), ("url:b", "1.0.0"), ("url:c", "2.0.0")] {
            let mut content = sample_content(key);
            content.processing_status = ProcessingStatus::Completed;
            content.pipeline_version = Some(version.to_owned());
            db.store_item(content).await.expect("store");
        }
        let mut unknown = sample_content("url:d");
        unknown.processing_status = ProcessingStatus::Completed;
        unknown.pipeline_version = Some("weird".to_owned());
        db.store_item(unknown).await.expect("store");

        let report = Content::version_drift_report("2.0.0", &db)
            .await
            .expect("report");

        assert_eq!(report.total_content, 4);
        assert_eq!(report.total_stale, 2);
        assert_eq!(report.unknown_version_count, 1);
        assert_eq!(
            report.stale_content,
            vec![DriftGroup {
                version: "1.0.0".into(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_parse_version_tuple() {
        assert_eq!(parse_version_tuple("1.2.3"), Some((1, 2, 3)));
        assert_eq!(parse_version_tuple("10.0.0"), Some((10, 0, 0)));
        assert_eq!(parse_version_tuple("1.2"), None);
        assert_eq!(parse_version_tuple("abc"), None);
        assert_eq!(parse_version_tuple("1.2.3.4"), None);
    }
}
