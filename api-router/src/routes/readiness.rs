use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::api_state::ApiState;

/// Ready when the graph store answers a trivial query.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.query("RETURN 1").await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
