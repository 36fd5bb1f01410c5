use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{api_state::ApiState, error::ApiError};

/// The verified caller identity attached to authenticated requests. Derived
/// from the presented key, never the key itself.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub String);

pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|value| value.to_str().ok())
        })
        .ok_or_else(|| ApiError::Unauthorized("missing API key".to_string()))?;

    if !state.config.api_keys.iter().any(|key| key == presented) {
        return Err(ApiError::Unauthorized("invalid API key".to_string()));
    }

    let digest = Sha256::digest(presented.as_bytes());
    let identity = format!("key-{:.16}", format!("{digest:x}"));
    request.extensions_mut().insert(CallerIdentity(identity));

    Ok(next.run(request).await)
}
