use axum::{extract::State, Json};
use common::storage::types::content::Content;
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
}

/// All tags in use, most used first.
pub async fn list_tags(State(state): State<ApiState>) -> Result<Json<Vec<TagCount>>, ApiError> {
    let tags = Content::tag_counts(&state.db)
        .await?
        .into_iter()
        .map(|(name, count)| TagCount { name, count })
        .collect();
    Ok(Json(tags))
}
