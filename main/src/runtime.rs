use std::sync::Arc;

use common::{
    llm::{Embedder, Generator, HttpReranker, IdentityReranker, OpenAiEmbedder, OpenAiGenerator, Reranker},
    storage::{blob::BlobStore, db::SurrealDbClient},
    utils::{config::AppConfig, keyword_matcher::KeywordMatcher},
};
use ingestion_pipeline::{
    fetchers::{
        arxiv::ArxivFetcher, github::GithubFetcher, semantic_scholar::SemanticScholarFetcher,
        youtube::YoutubeFetcher,
    },
    resolver::ResolverFetchers,
    EnricherConfig, EntityResolver, Ingestor, JobOrchestrator, OrchestratorConfig, UnifiedEnricher,
};
use retrieval_pipeline::AgenticRetriever;
use tokio::sync::RwLock;
use tracing::warn;

/// Everything the binaries share: storage handles, capability values, and
/// the assembled services.
pub struct Services {
    pub config: AppConfig,
    pub db: Arc<SurrealDbClient>,
    pub blob: BlobStore,
    pub ingestor: Arc<Ingestor>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub retriever: Arc<AgenticRetriever>,
}

/// Construct clients once and wire the services together. Capabilities are
/// plain values handed to whoever needs them; nothing is process-global.
pub async fn build_services(config: AppConfig) -> Result<Services, Box<dyn std::error::Error>> {
    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized(config.embedding_dimensions as usize)
        .await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::new(
        Arc::clone(&openai_client),
        config.generation_model.clone(),
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        openai_client,
        config.embedding_model.clone(),
        config.embedding_dimensions,
    ));
    let reranker: Arc<dyn Reranker> = match &config.rerank_endpoint {
        Some(endpoint) => Arc::new(HttpReranker::new(
            endpoint.clone(),
            config.rerank_api_key.clone(),
            "rerank-v2".to_owned(),
        )),
        None => Arc::new(IdentityReranker),
    };

    let blob = BlobStore::new(&config).await?;

    let enricher = Arc::new(UnifiedEnricher::new(
        Arc::clone(&generator),
        EnricherConfig {
            enabled: config.unified_pipeline_enabled,
            max_new_tags: config.unified_pipeline_max_new_tags,
            max_topics_per_content: config.entity_max_topics_per_content,
            min_confidence: config.entity_min_confidence,
        },
    ));

    let resolver = Arc::new(EntityResolver::new(
        Arc::clone(&db),
        enricher,
        Arc::new(RwLock::new(KeywordMatcher::new(0))),
        ResolverFetchers {
            github: Some(Arc::new(GithubFetcher::new(config.github_token.clone()))),
            arxiv: Some(Arc::new(ArxivFetcher::new())),
            scholar: Some(Arc::new(SemanticScholarFetcher::new(
                config.semantic_scholar_api_key.clone(),
            ))),
        },
        config.entity_fetch_external_metadata,
    ));
    if let Err(e) = resolver.refresh_matcher_cache().await {
        warn!(error = %e, "keyword matcher cache is empty until the next refresh");
    }

    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::clone(&db),
        Arc::clone(&resolver),
        Arc::clone(&embedder),
        OrchestratorConfig {
            enabled: config.unified_pipeline_enabled,
            pipeline_version: config.pipeline_version.clone(),
            webhook_url: config.webhook_url.clone(),
            webhook_secret: config.webhook_secret.clone(),
        },
    ));

    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&db),
        blob.clone(),
        Arc::clone(&orchestrator),
        Arc::new(YoutubeFetcher::new(config.youtube_api_key.clone())),
    ));

    let retriever = Arc::new(AgenticRetriever::new(
        Arc::clone(&db),
        generator,
        embedder,
        reranker,
    ));

    Ok(Services {
        config,
        db,
        blob,
        ingestor,
        orchestrator,
        retriever,
    })
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}
