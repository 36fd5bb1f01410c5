use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::CallerIdentity};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub content_id: String,
    pub content_type: String,
    pub title: String,
    pub job_id: Option<String>,
}

/// Unified ingest endpoint: YouTube and web URLs both land here.
pub async fn ingest_url(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return Err(ApiError::ValidationError("url must be http(s)".to_string()));
    }

    info!(url = %body.url, "ingest requested");
    let outcome = state.ingestor.ingest_url(&body.url, &caller.0).await?;

    Ok(Json(IngestResponse {
        content_id: outcome.content_id,
        content_type: outcome.content_type,
        title: outcome.title,
        job_id: outcome.job_id,
    }))
}
