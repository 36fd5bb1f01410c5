use uuid::Uuid;

use crate::{
    error::AppError, storage::db::SurrealDbClient, stored_object, utils::normalize::normalize_name,
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Topic,
    Repo,
    Paper,
    Tool,
    Person,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Topic => "topic",
            EntityType::Repo => "repo",
            EntityType::Paper => "paper",
            EntityType::Tool => "tool",
            EntityType::Person => "person",
        }
    }

    /// Parse a caller- or LLM-provided type string, `None` for junk.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "topic" => Some(EntityType::Topic),
            "repo" => Some(EntityType::Repo),
            "paper" => Some(EntityType::Paper),
            "tool" => Some(EntityType::Tool),
            "person" => Some(EntityType::Person),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    UrlDetected,
    #[default]
    AiExtracted,
    Manual,
}

stored_object!(Entity, "entity", {
    entity_type: EntityType,
    name: String,
    normalized_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    hierarchy: Vec<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    source: EntitySource
});

/// Fields for creating an entity when `find_or_create` misses.
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    pub description: Option<String>,
    pub hierarchy: Vec<String>,
    pub metadata: serde_json::Value,
    pub source: EntitySource,
}

impl Entity {
    pub fn new(name: String, entity_type: EntityType, fields: NewEntity) -> Self {
        let now = Utc::now();
        let normalized_name = normalize_name(&name);
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entity_type,
            name,
            normalized_name,
            description: fields.description,
            hierarchy: fields.hierarchy,
            metadata: fields.metadata,
            source: fields.source,
        }
    }

    /// Normalized aliases recorded under `metadata.aliases`.
    pub fn aliases(&self) -> Vec<String> {
        self.metadata
            .get("aliases")
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn find_by_normalized_name(
        normalized_name: &str,
        entity_type: Option<EntityType>,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut sql = "SELECT * FROM entity WHERE normalized_name = $normalized_name".to_owned();
        if entity_type.is_some() {
            sql.push_str(" AND entity_type = $entity_type");
        }
        sql.push_str(" LIMIT 1");

        let mut query = db
            .query(sql)
            .bind(("normalized_name", normalized_name.to_owned()));
        if let Some(entity_type) = entity_type {
            query = query.bind(("entity_type", entity_type));
        }

        Ok(query.await?.take::<Vec<Self>>(0)?.into_iter().next())
    }

    pub async fn find_by_alias(alias: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let normalized_alias = normalize_name(alias);
        let mut response = db
            .query("SELECT * FROM entity WHERE metadata.aliases CONTAINS $alias LIMIT 1")
            .bind(("alias", normalized_alias))
            .await?;
        Ok(response.take::<Vec<Self>>(0)?.into_iter().next())
    }

    /// Resolve an entity by normalized name, then by alias, creating it when
    /// both miss. Returns the entity and whether it was created.
    pub async fn find_or_create(
        name: &str,
        entity_type: EntityType,
        fields: NewEntity,
        db: &SurrealDbClient,
    ) -> Result<(Self, bool), AppError> {
        let normalized = normalize_name(name);

        if let Some(existing) =
            Self::find_by_normalized_name(&normalized, Some(entity_type), db).await?
        {
            return Ok((existing, false));
        }

        if let Some(existing) = Self::find_by_alias(name, db).await? {
            if existing.entity_type == entity_type {
                return Ok((existing, false));
            }
        }

        let entity = Self::new(name.to_owned(), entity_type, fields);
        let stored = db.store_item(entity.clone()).await?;
        Ok((stored.unwrap_or(entity), true))
    }

    pub async fn list(
        entity_type: Option<EntityType>,
        limit: usize,
        offset: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut sql = "SELECT * FROM entity".to_owned();
        if entity_type.is_some() {
            sql.push_str(" WHERE entity_type = $entity_type");
        }
        sql.push_str(" ORDER BY name LIMIT $limit START $offset");

        let mut query = db
            .query(sql)
            .bind(("limit", limit.max(1)))
            .bind(("offset", offset));
        if let Some(entity_type) = entity_type {
            query = query.bind(("entity_type", entity_type));
        }

        Ok(query.await?.take(0)?)
    }

    /// All entities, for rebuilding the keyword-matcher cache.
    pub async fn list_all(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        Ok(db.get_all_stored_items().await?)
    }

    /// All topics ordered for hierarchy rendering.
    pub async fn topic_hierarchy(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM entity WHERE entity_type = 'topic' ORDER BY hierarchy, name")
            .await?;
        Ok(response.take(0)?)
    }

    /// Rename an entity and/or merge in new aliases; normalized name follows
    /// the new display name.
    pub async fn rename(
        id: &str,
        name: Option<&str>,
        add_aliases: &[String],
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let Some(mut entity) = db.get_item::<Self>(id).await? else {
            return Ok(None);
        };

        if let Some(name) = name {
            entity.name = name.to_owned();
            entity.normalized_name = normalize_name(name);
        }
        if !add_aliases.is_empty() {
            let mut aliases = entity.aliases();
            for alias in add_aliases {
                let normalized = normalize_name(alias);
                if !normalized.is_empty() && !aliases.contains(&normalized) {
                    aliases.push(normalized);
                }
            }
            if !entity.metadata.is_object() {
                entity.metadata = serde_json::json!({});
            }
            entity.metadata["aliases"] = serde_json::json!(aliases);
        }
        entity.updated_at = Utc::now();

        let updated: Option<Self> = db
            .update(("entity", id))
            .content(entity)
            .await?;
        Ok(updated)
    }

    /// Delete the entity and all edges pointing at it.
    pub async fn delete_with_edges(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE content_entity WHERE entity_id = $entity_id")
            .bind(("entity_id", id.to_owned()))
            .await?;
        let _deleted: Option<Self> = db.delete_item(id).await?;
        Ok(())
    }
}
