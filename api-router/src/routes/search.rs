use axum::{extract::State, Json};
use retrieval_pipeline::{AgentSearchResult, RetrievedSource, SearchFilters};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub content_type: Option<String>,
    pub tier_min: Option<String>,
}

fn default_limit() -> usize {
    10
}

impl SearchRequest {
    fn validate(&self) -> Result<SearchFilters, ApiError> {
        if self.query.trim().is_empty() {
            return Err(ApiError::ValidationError("query must not be empty".to_string()));
        }
        if let Some(tier) = &self.tier_min {
            let normalized = tier.trim().to_uppercase();
            if !matches!(normalized.as_str(), "S" | "A" | "B" | "C" | "D") {
                return Err(ApiError::ValidationError(format!("invalid tier {tier}")));
            }
        }
        Ok(SearchFilters {
            content_type: self.content_type.clone(),
            tier_min: self.tier_min.clone(),
        })
    }
}

/// Single-query vector search.
pub async fn search(
    State(state): State<ApiState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Vec<RetrievedSource>>, ApiError> {
    let filters = body.validate()?;
    let sources = state
        .retriever
        .vector_search(&body.query, filters, body.limit.clamp(1, 50))
        .await?;
    Ok(Json(sources))
}

/// Full three-stage agentic retrieval with a cited answer.
pub async fn agentic_search(
    State(state): State<ApiState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<AgentSearchResult>, ApiError> {
    let filters = body.validate()?;
    let result = state
        .retriever
        .search(&body.query, filters, body.limit.clamp(1, 50))
        .await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_fails_validation() {
        let request = SearchRequest {
            query: "  ".into(),
            limit: 10,
            content_type: None,
            tier_min: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn bad_tier_fails_validation() {
        let request = SearchRequest {
            query: "rust".into(),
            limit: 10,
            content_type: None,
            tier_min: Some("Z".into()),
        };
        assert!(request.validate().is_err());

        let request = SearchRequest {
            query: "rust".into(),
            limit: 10,
            content_type: None,
            tier_min: Some("a".into()),
        };
        assert!(request.validate().is_ok());
    }
}
