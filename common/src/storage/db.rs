use crate::error::AppError;

use super::types::StoredObject;
use std::ops::Deref;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::debug;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

/// Schema declarations applied at startup. Each entry is recorded in the
/// `migration` table once applied, so re-runs skip work already done.
const SCHEMA_MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_content",
        "DEFINE TABLE IF NOT EXISTS content SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_content_resource_key ON content FIELDS metadata.resource_key;
         DEFINE INDEX IF NOT EXISTS idx_content_status ON content FIELDS processing_status;",
    ),
    (
        "0002_chunk",
        "DEFINE TABLE IF NOT EXISTS chunk SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_chunk_content ON chunk FIELDS content_id;",
    ),
    (
        "0003_entity",
        "DEFINE TABLE IF NOT EXISTS entity SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_entity_identity ON entity FIELDS normalized_name, entity_type UNIQUE;",
    ),
    (
        "0004_content_entity",
        "DEFINE TABLE IF NOT EXISTS content_entity SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_edge_pair ON content_entity FIELDS content_id, entity_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS idx_edge_entity ON content_entity FIELDS entity_id;",
    ),
    (
        "0005_link",
        "DEFINE TABLE IF NOT EXISTS link SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_link_source ON link FIELDS source;
         DEFINE INDEX IF NOT EXISTS idx_link_target ON link FIELDS target;",
    ),
    (
        "0006_pipeline_job",
        "DEFINE TABLE IF NOT EXISTS pipeline_job SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_job_status ON pipeline_job FIELDS status;
         DEFINE INDEX IF NOT EXISTS idx_job_active_key ON pipeline_job FIELDS active_key UNIQUE;
         DEFINE INDEX IF NOT EXISTS idx_job_created ON pipeline_job FIELDS created_at;",
    ),
    (
        "0007_tag_alias",
        "DEFINE TABLE IF NOT EXISTS tag_alias SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_tag_alias ON tag_alias FIELDS variant, canonical UNIQUE;",
    ),
];

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Apply schema declarations and vector indexes, logging each applied
    /// migration by name.
    pub async fn ensure_initialized(&self, embedding_dimensions: usize) -> Result<(), AppError> {
        for (name, statements) in SCHEMA_MIGRATIONS {
            if self.is_migration_applied(name).await? {
                continue;
            }
            self.client.query(*statements).await?;
            self.record_migration(name).await?;
            debug!(migration = name, "applied schema migration");
        }

        // The HNSW index depends on the configured embedding width, so it is
        // (re)declared outside the logged migrations.
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_chunk_embedding ON chunk FIELDS embedding HNSW DIMENSION {embedding_dimensions}"
            ))
            .await?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, AppError> {
        let mut response = self
            .client
            .query("SELECT VALUE name FROM migration WHERE name = $name LIMIT 1")
            .bind(("name", name.to_owned()))
            .await?;
        let existing: Option<String> = response.take(0)?;
        Ok(existing.is_some())
    }

    async fn record_migration(&self, name: &str) -> Result<(), AppError> {
        self.client
            .query("CREATE migration CONTENT { name: $name, applied_at: time::now() }")
            .bind(("name", name.to_owned()))
            .await?;
        Ok(())
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve all objects from a certain table
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Operation to retrieve a single object by its ID
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its ID
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
