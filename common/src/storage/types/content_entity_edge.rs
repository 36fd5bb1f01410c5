use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::entity::EntitySource;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Discusses,
    Mentions,
    Uses,
    Cites,
    Demonstrates,
}

impl EdgeType {
    /// Parse an LLM-provided edge type, falling back to `mentions`.
    pub fn parse_or_mentions(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "discusses" => EdgeType::Discusses,
            "uses" => EdgeType::Uses,
            "cites" => EdgeType::Cites,
            "demonstrates" => EdgeType::Demonstrates,
            _ => EdgeType::Mentions,
        }
    }
}

stored_object!(ContentEntityEdge, "content_entity", {
    content_id: String,
    entity_id: String,
    edge_type: EdgeType,
    confidence: f32,
    source: EntitySource
});

impl ContentEntityEdge {
    pub fn new(
        content_id: String,
        entity_id: String,
        edge_type: EdgeType,
        confidence: f32,
        source: EntitySource,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content_id,
            entity_id,
            edge_type,
            confidence,
            source,
        }
    }

    /// Create the edge; the unique `(content_id, entity_id)` index rejects a
    /// second edge for the same pair.
    pub async fn create(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let stored = db.store_item(self).await?;
        stored.ok_or_else(|| AppError::InternalError("edge create returned no record".into()))
    }

    pub async fn get_by_content(
        content_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM content_entity WHERE content_id = $content_id")
            .bind(("content_id", content_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_by_entity(
        entity_id: &str,
        limit: usize,
        offset: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM content_entity WHERE entity_id = $entity_id LIMIT $limit START $offset",
            )
            .bind(("entity_id", entity_id.to_owned()))
            .bind(("limit", limit.max(1)))
            .bind(("offset", offset))
            .await?;
        Ok(response.take(0)?)
    }

    /// Drop every edge of a content before a reprocess writes fresh ones.
    pub async fn delete_by_content(content_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE content_entity WHERE content_id = $content_id")
            .bind(("content_id", content_id.to_owned()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn initialized_db() -> SurrealDbClient {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(3).await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn test_unique_pair_enforced() {
        let db = initialized_db().await;

        ContentEntityEdge::new(
            "c1".into(),
            "e1".into(),
            EdgeType::Uses,
            0.9,
            EntitySource::UrlDetected,
        )
        .create(&db)
        .await
        .expect("first edge");

        let duplicate = ContentEntityEdge::new(
            "c1".into(),
            "e1".into(),
            EdgeType::Mentions,
            0.7,
            EntitySource::AiExtracted,
        )
        .create(&db)
        .await;
        assert!(duplicate.is_err(), "second edge for the pair must fail");

        let edges = ContentEntityEdge::get_by_content("c1", &db)
            .await
            .expect("get");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::Uses);
    }

    #[tokio::test]
    async fn test_delete_by_content_then_recreate() {
        let db = initialized_db().await;

        for entity_id in ["e1", "e2"] {
            ContentEntityEdge::new(
                "c1".into(),
                entity_id.into(),
                EdgeType::Mentions,
                0.85,
                EntitySource::AiExtracted,
            )
            .create(&db)
            .await
            .expect("edge");
        }

        ContentEntityEdge::delete_by_content("c1", &db)
            .await
            .expect("delete");

        // Reprocessing recreates edges without tripping the unique index.
        ContentEntityEdge::new(
            "c1".into(),
            "e1".into(),
            EdgeType::Discusses,
            0.9,
            EntitySource::AiExtracted,
        )
        .create(&db)
        .await
        .expect("recreate");

        let edges = ContentEntityEdge::get_by_content("c1", &db)
            .await
            .expect("get");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::Discusses);
    }

    #[test]
    fn test_parse_or_mentions() {
        assert_eq!(EdgeType::parse_or_mentions("USES"), EdgeType::Uses);
        assert_eq!(EdgeType::parse_or_mentions("discusses"), EdgeType::Discusses);
        assert_eq!(EdgeType::parse_or_mentions("unknown"), EdgeType::Mentions);
    }
}
