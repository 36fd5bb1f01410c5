use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One reranked document: the text, its position in the input list, and the
/// relevance score the reranker assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub text: String,
    pub original_index: usize,
    pub score: f32,
}

/// Reranking capability: order candidate snippets by relevance to a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedDocument>, AppError>;
}

/// Posts to an OpenAI-compatible `/rerank` endpoint (Jina/Cohere wire shape).
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(endpoint: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedDocument>, AppError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&RerankRequest {
            model: &self.model,
            query,
            documents,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: RerankResponse = response.json().await?;

        let mut ranked: Vec<RankedDocument> = body
            .results
            .into_iter()
            .filter(|r| r.index < documents.len())
            .map(|r| RankedDocument {
                text: documents[r.index].clone(),
                original_index: r.index,
                score: r.relevance_score,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(ranked)
    }
}

/// Keeps the fused order untouched. Used when no rerank endpoint is
/// configured, so retrieval still works end to end.
pub struct IdentityReranker;

#[async_trait]
impl Reranker for IdentityReranker {
    async fn rank(&self, _query: &str, documents: &[String]) -> Result<Vec<RankedDocument>, AppError> {
        Ok(documents
            .iter()
            .enumerate()
            .map(|(index, text)| RankedDocument {
                text: text.clone(),
                original_index: index,
                score: 1.0 - (index as f32 / documents.len().max(1) as f32),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_reranker_preserves_order() {
        let documents = vec!["first".to_owned(), "second".to_owned(), "third".to_owned()];
        let ranked = IdentityReranker
            .rank("query", &documents)
            .await
            .expect("rank");

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].original_index, 0);
        assert_eq!(ranked[2].original_index, 2);
        assert!(ranked[0].score > ranked[1].score);
        assert!(ranked[1].score > ranked[2].score);
    }

    #[tokio::test]
    async fn identity_reranker_handles_empty_input() {
        let ranked = IdentityReranker.rank("query", &[]).await.expect("rank");
        assert!(ranked.is_empty());
    }
}
