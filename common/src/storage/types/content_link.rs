use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Wiki,
    Markdown,
}

stored_object!(ContentLink, "link", {
    source: String,
    #[serde(default)]
    target: Option<String>,
    link_text: String,
    link_type: LinkType
});

impl ContentLink {
    pub fn new(
        source: String,
        target: Option<String>,
        link_text: String,
        link_type: LinkType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source,
            target,
            link_text,
            link_type,
        }
    }

    pub async fn get_by_source(source: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM link WHERE source = $source")
            .bind(("source", source.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_by_target(target: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM link WHERE target = $target")
            .bind(("target", target.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Links are replaced wholesale per source on each extraction run.
    pub async fn delete_by_source(source: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE link WHERE source = $source")
            .bind(("source", source.to_owned()))
            .await?;
        Ok(())
    }

    /// Delete links touching a content from either side, for cascade deletes.
    pub async fn delete_touching(content_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE link WHERE source = $id OR target = $id")
            .bind(("id", content_id.to_owned()))
            .await?;
        Ok(())
    }

    pub async fn list(limit: usize, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM link LIMIT $limit")
            .bind(("limit", limit.max(1)))
            .await?;
        Ok(response.take(0)?)
    }
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

    #[tokio::test]
    async fn test_delete_by_source_is_scoped() {
        let db = memory_db().await;

        db.store_item(ContentLink::new(
            "a".into(),
            Some("b".into()),
            "B".into(),
            LinkType::Wiki,
        ))
        .await
        .expect("store 1");
        db.store_item(ContentLink::new(
            "a".into(),
            None,
            "dangling".into(),
            LinkType::Markdown,
        ))
        .await
        .expect("store 2");
        db.store_item(ContentLink::new(
            "c".into(),
            Some("a".into()),
            "A".into(),
            LinkType::Wiki,
        ))
        .await
        .expect("store 3");

        ContentLink::delete_by_source("a", &db).await.expect("delete");

        assert!(ContentLink::get_by_source("a", &db).await.expect("get").is_empty());
        // Backlink from another source survives.
        assert_eq!(ContentLink::get_by_target("a", &db).await.expect("get").len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_links_keep_null_target() {
        let db = memory_db().await;
        db.store_item(ContentLink::new(
            "a".into(),
            None,
            "Missing Page".into(),
            LinkType::Wiki,
        ))
        .await
        .expect("store");

        let links = ContentLink::get_by_source("a", &db).await.expect("get");
        assert_eq!(links.len(), 1);
        assert!(links[0].target.is_none());
    }
}
