use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(TagAlias, "tag_alias", {
    variant: String,
    canonical: String,
    usage_count: u32
});

impl TagAlias {
    pub fn new(variant: String, canonical: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            variant,
            canonical,
            usage_count: 1,
        }
    }

    /// Upsert the `(variant, canonical)` mapping, bumping `usage_count` when
    /// it already exists.
    pub async fn record(
        variant: &str,
        canonical: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        if variant.is_empty() || canonical.is_empty() {
            return Ok(());
        }

        let mut response = db
            .query(
                "UPDATE tag_alias
                 SET usage_count = usage_count + 1, updated_at = time::now()
                 WHERE variant = $variant AND canonical = $canonical
                 RETURN AFTER",
            )
            .bind(("variant", variant.to_owned()))
            .bind(("canonical", canonical.to_owned()))
            .await?;
        let updated: Vec<Self> = response.take(0)?;
        if !updated.is_empty() {
            return Ok(());
        }

        db.store_item(Self::new(variant.to_owned(), canonical.to_owned()))
            .await?;
        Ok(())
    }

    pub async fn find(
        variant: &str,
        canonical: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM tag_alias WHERE variant = $variant AND canonical = $canonical LIMIT 1",
            )
            .bind(("variant", variant.to_owned()))
            .bind(("canonical", canonical.to_owned()))
            .await?;
        Ok(response.take::<Vec<Self>>(0)?.into_iter().next())
    }

    /// Most used variant → canonical mappings.
    pub async fn list(limit: usize, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM tag_alias ORDER BY usage_count DESC, updated_at DESC LIMIT $limit",
            )
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
    async fn test_record_increments_usage_count() {
        let db = memory_db().await;

        TagAlias::record("programing", "programming", &db)
            .await
            .expect("first record");
        TagAlias::record("programing", "programming", &db)
            .await
            .expect("second record");

        let alias = TagAlias::find("programing", "programming", &db)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(alias.usage_count, 2);
    }

    #[tokio::test]
    async fn test_record_ignores_empty_inputs() {
        let db = memory_db().await;
        TagAlias::record("", "programming", &db).await.expect("noop");
        TagAlias::record("variant", "", &db).await.expect("noop");

        let all = TagAlias::list(10, &db).await.expect("list");
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_pairs_are_separate_rows() {
        let db = memory_db().await;
        TagAlias::record("k8s", "kubernetes", &db).await.expect("a");
        TagAlias::record("kube", "kubernetes", &db).await.expect("b");

        let all = TagAlias::list(10, &db).await.expect("list");
        assert_eq!(all.len(), 2);
    }
}
