use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::storage::types::content::{Content, ContentFilter, ProcessingStatus};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::CallerIdentity};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub content_type: Option<String>,
    /// Comma-separated tag filter.
    pub tags: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_content(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Content>>, ApiError> {
    let tags = params.tags.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>()
    });

    let items = Content::list(
        ContentFilter {
            content_type: params.content_type,
            tags,
            exclude_tags: None,
            limit: params.limit.min(200),
            offset: params.offset,
        },
        &state.db,
    )
    .await?;

    Ok(Json(items))
}

pub async fn get_content(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Content>, ApiError> {
    let content = state
        .db
        .get_item::<Content>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("content {id}")))?;
    Ok(Json(content))
}

/// Stream the stored payload back with its recorded MIME type.
pub async fn get_content_body(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state
        .db
        .get_item::<Content>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("content {id}")))?;

    if content.file_path.is_empty() {
        return Err(ApiError::NotFound(format!("content {id} has no payload")));
    }

    let bytes = state
        .blob
        .get(&content.file_path)
        .await
        .map_err(|_| ApiError::NotFound(format!("payload for content {id}")))?;

    Ok(([(header::CONTENT_TYPE, content.mime_type)], bytes))
}

#[derive(Debug, Deserialize)]
pub struct PatchContentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub async fn patch_content(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<PatchContentRequest>,
) -> Result<Json<Content>, ApiError> {
    let updated = Content::patch_user_fields(
        &id,
        body.title.as_deref(),
        body.description.as_deref(),
        body.tags.as_deref(),
        &state.db,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("content {id}")))?;

    Ok(Json(updated))
}

pub async fn delete_content(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.ingestor.delete_content(&id).await?;
    info!(content_id = %id, "content deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReprocessParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub job_id: Option<String>,
}

/// Resubmit a content to the pipeline. Without `force`, an already
/// completed record is left alone.
pub async fn reprocess_content(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<ReprocessParams>,
) -> Result<Json<ReprocessResponse>, ApiError> {
    let content = state
        .db
        .get_item::<Content>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("content {id}")))?;

    if content.processing_status == ProcessingStatus::Completed && !params.force {
        return Ok(Json(ReprocessResponse { job_id: None }));
    }

    let resource_key = content
        .resource_key()
        .ok_or_else(|| ApiError::ValidationError("content has no resource key".to_string()))?
        .to_owned();

    let body = state
        .blob
        .get(&content.file_path)
        .await
        .map_err(|_| ApiError::NotFound(format!("payload for content {id}")))?;
    let text = String::from_utf8_lossy(&body).into_owned();

    let job = state
        .orchestrator
        .submit(&id, &text, &content.content_type, &content.title, &resource_key)
        .await?;

    Ok(Json(ReprocessResponse {
        job_id: job.map(|j| j.id),
    }))
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    #[form_data(limit = "10000000")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub content_id: String,
    pub content_type: String,
    pub title: String,
    pub job_id: Option<String>,
}

/// Multipart document upload.
pub async fn upload_content(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerIdentity>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let file_name = input
        .file
        .metadata
        .file_name
        .clone()
        .unwrap_or_else(|| "upload.bin".to_string());
    let mime_type = input
        .file
        .metadata
        .content_type
        .clone()
        .unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .to_string()
        });

    let data = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(common::error::AppError::from)?;

    let outcome = state
        .ingestor
        .ingest_document(&file_name, Bytes::from(data), &mime_type, &caller.0)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            content_id: outcome.content_id,
            content_type: outcome.content_type,
            title: outcome.title,
            job_id: outcome.job_id,
        }),
    ))
}
