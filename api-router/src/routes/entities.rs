use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common::{
    storage::types::{
        content::Content,
        content_entity_edge::ContentEntityEdge,
        entity::{Entity, EntityType},
    },
    utils::normalize::find_near_duplicates,
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub entity_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_entities(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let entity_type = match params.entity_type.as_deref() {
        Some(raw) => Some(
            EntityType::parse(raw)
                .ok_or_else(|| ApiError::ValidationError(format!("unknown entity type {raw}")))?,
        ),
        None => None,
    };

    let entities = Entity::list(entity_type, params.limit.min(500), params.offset, &state.db)
        .await?;
    Ok(Json(entities))
}

pub async fn get_entity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Entity>, ApiError> {
    let entity = state
        .db
        .get_item::<Entity>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("entity {id}")))?;
    Ok(Json(entity))
}

#[derive(Debug, Serialize)]
pub struct EntityContentEntry {
    pub content: Content,
    pub edge: ContentEntityEdge,
}

/// All content attached to an entity, with the edge carried along.
pub async fn get_entity_content(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<EntityContentEntry>>, ApiError> {
    if state
        .db
        .get_item::<Entity>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .is_none()
    {
        return Err(ApiError::NotFound(format!("entity {id}")));
    }

    let edges =
        ContentEntityEdge::get_by_entity(&id, params.limit.min(200), params.offset, &state.db)
            .await?;

    let mut entries = Vec::with_capacity(edges.len());
    for edge in edges {
        if let Some(content) = state
            .db
            .get_item::<Content>(&edge.content_id)
            .await
            .map_err(common::error::AppError::from)?
        {
            entries.push(EntityContentEntry { content, edge });
        }
    }

    Ok(Json(entries))
}

/// Flat topic listing ordered by hierarchy path; each row carries its full
/// ancestor chain, which is enough to render the tree.
pub async fn topic_hierarchy(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    Ok(Json(Entity::topic_hierarchy(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct DuplicateParams {
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,
}

fn default_max_distance() -> usize {
    1
}

/// Near-duplicate entity groups by normalized-name edit distance.
pub async fn find_duplicates(
    State(state): State<ApiState>,
    Query(params): Query<DuplicateParams>,
) -> Result<Json<Vec<Vec<Entity>>>, ApiError> {
    if params.max_distance > 5 {
        return Err(ApiError::ValidationError(
            "max_distance must be at most 5".to_string(),
        ));
    }

    let entities = Entity::list_all(&state.db).await?;
    let groups = find_near_duplicates(&entities, |e| &e.normalized_name, params.max_distance)
        .into_iter()
        .map(|group| group.into_iter().cloned().collect())
        .collect();

    Ok(Json(groups))
}

#[derive(Debug, Deserialize)]
pub struct PatchEntityRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub add_aliases: Vec<String>,
}

pub async fn patch_entity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<PatchEntityRequest>,
) -> Result<Json<Entity>, ApiError> {
    let updated = Entity::rename(&id, body.name.as_deref(), &body.add_aliases, &state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("entity {id}")))?;
    Ok(Json(updated))
}

pub async fn delete_entity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state
        .db
        .get_item::<Entity>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .is_none()
    {
        return Err(ApiError::NotFound(format!("entity {id}")));
    }

    Entity::delete_with_edges(&id, &state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}
