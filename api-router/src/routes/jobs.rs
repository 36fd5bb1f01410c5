use axum::{
    extract::{Path, Query, State},
    Json,
};
use common::storage::types::{
    content::{Content, DriftReport},
    pipeline_job::{JobStatus, PipelineJob},
};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

fn parse_status(raw: &str) -> Result<JobStatus, ApiError> {
    match raw.to_lowercase().as_str() {
        "pending" => Ok(JobStatus::Pending),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(ApiError::ValidationError(format!(
            "unknown job status {other}"
        ))),
    }
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PipelineJob>>, ApiError> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let jobs = PipelineJob::list(status, params.limit.min(200), &state.db).await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<PipelineJob>, ApiError> {
    let job = state
        .db
        .get_item::<PipelineJob>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;
    Ok(Json(job))
}

/// Cancellation is a flag observed at stage boundaries; terminal jobs come
/// back unchanged.
pub async fn cancel_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<PipelineJob>, ApiError> {
    let job = PipelineJob::cancel(&id, &state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;
    Ok(Json(job))
}

/// Completed content grouped by pipeline version, against the configured
/// current version.
pub async fn drift_report(State(state): State<ApiState>) -> Result<Json<DriftReport>, ApiError> {
    let report = Content::version_drift_report(&state.config.pipeline_version, &state.db).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(parse_status("pending").expect("parse"), JobStatus::Pending);
        assert_eq!(parse_status("FAILED").expect("parse"), JobStatus::Failed);
        assert!(parse_status("bogus").is_err());
    }
}
