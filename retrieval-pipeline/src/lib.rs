pub mod expansion;
pub mod fusion;
pub mod search;
pub mod synthesis;

use std::sync::Arc;
use std::time::Instant;

use common::{
    error::AppError,
    llm::{Embedder, Generator, Reranker},
    storage::db::SurrealDbClient,
};
use serde::Serialize;
use tracing::{info, instrument};

/// One retrieved source document, collapsed to its best-matching chunk.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSource {
    pub id: String,
    pub content_type: String,
    pub title: Option<String>,
    pub score: f32,
    pub snippet: Option<String>,
}

/// Optional narrowing of the chunk search space.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub content_type: Option<String>,
    /// Keep only content rated at this tier or better (`A` means S and A).
    pub tier_min: Option<String>,
}

/// Per-stage wall-clock timings in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub expansion_ms: u64,
    pub retrieval_ms: u64,
    pub rerank_ms: u64,
    pub synthesis_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct AgentSearchResult {
    pub answer: String,
    pub sources: Vec<RetrievedSource>,
    pub timing: StageTimings,
}

/// Three-stage agentic retriever: expand the query, run multi-query vector
/// search fused by reciprocal rank, rerank, synthesize a cited answer.
pub struct AgenticRetriever {
    db: Arc<SurrealDbClient>,
    generator: Arc<dyn Generator>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
}

impl AgenticRetriever {
    pub fn new(
        db: Arc<SurrealDbClient>,
        generator: Arc<dyn Generator>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self {
            db,
            generator,
            embedder,
            reranker,
        }
    }

    #[instrument(skip_all)]
    pub async fn search(
        &self,
        query: &str,
        filters: SearchFilters,
        limit: usize,
    ) -> Result<AgentSearchResult, AppError> {
        let total_start = Instant::now();
        let mut timing = StageTimings::default();

        let stage = Instant::now();
        let queries = expansion::expand_query(self.generator.as_ref(), query).await;
        timing.expansion_ms = stage.elapsed().as_millis() as u64;

        let stage = Instant::now();
        let mut ranked_lists = Vec::with_capacity(queries.len());
        for sub_query in &queries {
            let embedding = self.embedder.embed(sub_query).await?;
            let hits =
                search::search_by_embedding(&self.db, embedding, limit * 2, &filters).await?;
            ranked_lists.push(hits);
        }
        let mut fused = fusion::rrf_fuse(ranked_lists, limit * 2);
        timing.retrieval_ms = stage.elapsed().as_millis() as u64;

        let stage = Instant::now();
        if !fused.is_empty() {
            let documents: Vec<String> = fused
                .iter()
                .map(|source| source.snippet.clone().unwrap_or_default())
                .collect();
            let ranked = self.reranker.rank(query, &documents).await?;

            let mut reranked = Vec::with_capacity(limit.min(ranked.len()));
            for entry in ranked.into_iter().take(limit) {
                if let Some(source) = fused.get(entry.original_index) {
                    let mut source = source.clone();
                    source.score = entry.score;
                    reranked.push(source);
                }
            }
            fused = reranked;
        }
        timing.rerank_ms = stage.elapsed().as_millis() as u64;

        let stage = Instant::now();
        let answer = synthesis::synthesize(self.generator.as_ref(), query, &fused).await;
        timing.synthesis_ms = stage.elapsed().as_millis() as u64;

        timing.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            queries = queries.len(),
            sources = fused.len(),
            total_ms = timing.total_ms,
            "agentic search finished"
        );

        Ok(AgentSearchResult {
            answer,
            sources: fused,
            timing,
        })
    }

    /// Single-query vector search, the `/search` endpoint's core.
    pub async fn vector_search(
        &self,
        query: &str,
        filters: SearchFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedSource>, AppError> {
        let embedding = self.embedder.embed(query).await?;
        search::search_by_embedding(&self.db, embedding, limit, &filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::llm::{GenerateOptions, IdentityReranker};
    use common::storage::types::{chunk::Chunk, content::Content};
    use uuid::Uuid;

    /// Answers the expansion prompt with two queries and every other prompt
    /// with a cited answer.
    struct ScriptedGenerator;

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str, _: GenerateOptions) -> Result<String, AppError> {
            if prompt.contains("diverse search queries") {
                Ok(r#"{"queries": ["rust async", "tokio runtime"]}"#.to_owned())
            } else {
                Ok("Tokio drives async Rust [1].".to_owned())
            }
        }
    }

    /// Maps known query strings onto fixed unit vectors.
    struct MappedEmbedder;

    #[async_trait]
    impl Embedder for MappedEmbedder {
        fn dimensions(&self) -> u32 {
            3
        }

        async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
            Ok(match input {
                "rust async" => vec![0.0, 1.0, 0.0],
                "tokio runtime" => vec![0.0, 0.0, 1.0],
                _ => vec![1.0, 0.0, 0.0],
            })
        }
    }

    async fn seeded_retriever() -> AgenticRetriever {
        let database = &Uuid::new_v4().to_string();
        let db = common::storage::db::SurrealDbClient::memory("test_ns", database)
            .await
            .expect("memory db");
        db.ensure_initialized(3).await.expect("init");
        let db = Arc::new(db);

        for (id, embedding) in [
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![0.0, 1.0, 0.0]),
            ("c", vec![0.0, 0.0, 1.0]),
        ] {
            let mut content = Content::new(
                "web".into(),
                format!("Title {id}"),
                "text/markdown".into(),
                1,
                format!("web/{id}/content.md"),
                "caller".into(),
                vec![],
                serde_json::json!({}),
            );
            content.id = id.to_owned();
            db.store_item(content).await.expect("content");
            Chunk::replace_for_content(id, vec![(format!("chunk {id}"), embedding)], &db)
                .await
                .expect("chunk");
        }

        AgenticRetriever::new(
            db,
            Arc::new(ScriptedGenerator),
            Arc::new(MappedEmbedder),
            Arc::new(IdentityReranker),
        )
    }

    #[tokio::test]
    async fn agentic_search_runs_all_stages() {
        let retriever = seeded_retriever().await;

        let result = retriever
            .search("how does tokio work", SearchFilters::default(), 5)
            .await
            .expect("search");

        // Three expanded queries (original + two) each hit their own
        // content; every content appears once.
        let mut ids: Vec<&str> = result.sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert_eq!(result.answer, "Tokio drives async Rust [1].");
        assert!(result.sources.iter().all(|s| s.title.is_some()));
        assert!(result.timing.total_ms >= result.timing.expansion_ms);
    }

    #[tokio::test]
    async fn vector_search_returns_single_query_hits() {
        let retriever = seeded_retriever().await;

        let sources = retriever
            .vector_search("anything else", SearchFilters::default(), 5)
            .await
            .expect("search");

        assert_eq!(sources.len(), 1, "only the aligned chunk clears the floor");
        assert_eq!(sources[0].id, "a");
        assert_eq!(sources[0].snippet.as_deref(), Some("chunk a"));
    }
}
