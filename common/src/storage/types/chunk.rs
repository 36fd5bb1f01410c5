use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Chunk, "chunk", {
    content_id: String,
    text: String,
    chunk_index: usize,
    embedding: Vec<f32>
});

/// One vector-search hit, already collapsed to plain fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkHit {
    pub content_id: String,
    pub text: String,
    pub score: f32,
}

/// Similarity floor below which chunks are considered unrelated.
pub const SIMILARITY_FLOOR: f32 = 0.30;

const TIER_ORDER: [&str; 5] = ["S", "A", "B", "C", "D"];

/// Tiers equal or better than `tier_min`; empty for an invalid input.
pub fn tiers_at_or_above(tier_min: &str) -> Vec<String> {
    let normalized = tier_min.trim().to_uppercase();
    match TIER_ORDER.iter().position(|t| *t == normalized) {
        Some(idx) => TIER_ORDER[..=idx].iter().map(|t| (*t).to_owned()).collect(),
        None => Vec::new(),
    }
}

impl Chunk {
    pub fn new(content_id: String, text: String, chunk_index: usize, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content_id,
            text,
            chunk_index,
            embedding,
        }
    }

    /// Replace the chunk set of a content atomically enough for our
    /// purposes: delete everything for the content, then insert the new
    /// sequence with dense 0-based indexes.
    pub async fn replace_for_content(
        content_id: &str,
        chunks: Vec<(String, Vec<f32>)>,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        Self::delete_by_content(content_id, db).await?;

        let count = chunks.len();
        for (index, (text, embedding)) in chunks.into_iter().enumerate() {
            let chunk = Self::new(content_id.to_owned(), text, index, embedding);
            db.store_item(chunk).await?;
        }
        Ok(count)
    }

    pub async fn delete_by_content(content_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE chunk WHERE content_id = $content_id")
            .bind(("content_id", content_id.to_owned()))
            .await?;
        Ok(())
    }

    pub async fn get_by_content(content_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM chunk WHERE content_id = $content_id ORDER BY chunk_index ASC")
            .bind(("content_id", content_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Cosine-similarity search over chunk embeddings. Optional filters
    /// restrict hits to a content type or to content rated at or above a
    /// quality tier.
    pub async fn vector_search(
        query_embedding: Vec<f32>,
        limit: usize,
        content_type: Option<&str>,
        tier_min: Option<&str>,
        db: &SurrealDbClient,
    ) -> Result<Vec<ChunkHit>, AppError> {
        let mut filters = String::new();
        if content_type.is_some() {
            filters.push_str(
                " AND content_id IN (SELECT VALUE record::id(id) FROM content WHERE content_type = $content_type)",
            );
        }
        let allowed_tiers = tier_min.map(tiers_at_or_above);
        if allowed_tiers.is_some() {
            filters.push_str(
                " AND content_id IN (SELECT VALUE record::id(id) FROM content WHERE tier IN $tiers)",
            );
        }

        let sql = format!(
            "SELECT content_id, text,
                    vector::similarity::cosine(embedding, $embedding) AS score
             FROM chunk
             WHERE embedding != NONE
               AND vector::similarity::cosine(embedding, $embedding) > $floor
               {filters}
             ORDER BY score DESC
             LIMIT $limit"
        );

        let mut query = db
            .query(sql)
            .bind(("embedding", query_embedding))
            .bind(("floor", SIMILARITY_FLOOR))
            .bind(("limit", limit.max(1)));
        if let Some(content_type) = content_type {
            query = query.bind(("content_type", content_type.to_owned()));
        }
        if let Some(tiers) = allowed_tiers {
            query = query.bind(("tiers", tiers));
        }

        Ok(query.await?.take(0)?)
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
    async fn test_replace_for_content_keeps_indexes_dense() {
        let db = memory_db().await;

        Chunk::replace_for_content(
            "c1",
            vec![
                ("first".into(), vec![1.0, 0.0, 0.0]),
                ("second".into(), vec![0.0, 1.0, 0.0]),
                ("third".into(), vec![0.0, 0.0, 1.0]),
            ],
            &db,
        )
        .await
        .expect("first write");

        // Reprocessing with fewer chunks must not leave stale rows behind.
        Chunk::replace_for_content(
            "c1",
            vec![
                ("updated first".into(), vec![1.0, 0.0, 0.0]),
                ("updated second".into(), vec![0.0, 1.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("second write");

        let chunks = Chunk::get_by_content("c1", &db).await.expect("get");
        assert_eq!(chunks.len(), 2);
        let indexes: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(chunks[0].text, "updated first");
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_similarity_and_applies_floor() {
        let db = memory_db().await;

        Chunk::replace_for_content(
            "close",
            vec![("close match".into(), vec![0.9, 0.1, 0.0])],
            &db,
        )
        .await
        .expect("store close");
        Chunk::replace_for_content(
            "far",
            vec![("orthogonal".into(), vec![0.0, 0.0, 1.0])],
            &db,
        )
        .await
        .expect("store far");

        let hits = Chunk::vector_search(vec![1.0, 0.0, 0.0], 10, None, None, &db)
            .await
            .expect("search");

        assert_eq!(hits.len(), 1, "orthogonal chunk is below the floor");
        assert_eq!(hits[0].content_id, "close");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_vector_search_filters_by_content_type() {
        use crate::storage::types::content::Content;

        let db = memory_db().await;
        let mut youtube = Content::new(
            "youtube".into(),
            "Video".into(),
            "text/plain".into(),
            1,
            "youtube/x/transcript.txt".into(),
            "caller".into(),
            vec![],
            serde_json::json!({}),
        );
        youtube.id = "yt1".into();
        let mut web = Content::new(
            "web".into(),
            "Page".into(),
            "text/markdown".into(),
            1,
            "web/x/content.md".into(),
            "caller".into(),
            vec![],
            serde_json::json!({}),
        );
        web.id = "web1".into();
        db.store_item(youtube).await.expect("store yt");
        db.store_item(web).await.expect("store web");

        Chunk::replace_for_content("yt1", vec![("a video".into(), vec![1.0, 0.0, 0.0])], &db)
            .await
            .expect("yt chunk");
        Chunk::replace_for_content("web1", vec![("a page".into(), vec![1.0, 0.0, 0.0])], &db)
            .await
            .expect("web chunk");

        let hits = Chunk::vector_search(vec![1.0, 0.0, 0.0], 10, Some("web"), None, &db)
            .await
            .expect("search");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content_id, "web1");
    }

    #[test]
    fn test_tiers_at_or_above() {
        assert_eq!(tiers_at_or_above("A"), vec!["S", "A"]);
        assert_eq!(tiers_at_or_above("s"), vec!["S"]);
        assert_eq!(tiers_at_or_above("D").len(), 5);
        assert!(tiers_at_or_above("X").is_empty());
    }
}
