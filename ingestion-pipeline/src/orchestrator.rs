use std::sync::Arc;
use std::time::Instant;

use common::{
    error::{AppError, StageError},
    llm::Embedder,
    storage::{
        db::SurrealDbClient,
        types::{
            chunk::Chunk,
            content::{Content, ProcessingStatus},
            content_entity_edge::ContentEntityEdge,
            pipeline_job::PipelineJob,
        },
    },
};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{chunking, linking, resolver::EntityResolver};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub enabled: bool,
    pub pipeline_version: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

/// Accepts pipeline submissions, deduplicates them by resource key, and
/// drives claimed jobs through their stages.
pub struct JobOrchestrator {
    db: Arc<SurrealDbClient>,
    resolver: Arc<EntityResolver>,
    embedder: Arc<dyn Embedder>,
    config: OrchestratorConfig,
    http: reqwest::Client,
}

impl JobOrchestrator {
    pub fn new(
        db: Arc<SurrealDbClient>,
        resolver: Arc<EntityResolver>,
        embedder: Arc<dyn Embedder>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            resolver,
            embedder,
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Submit a content for processing. Returns `None` when the unified
    /// pipeline is disabled, the already-active job for the resource key,
    /// or a freshly persisted pending job.
    pub async fn submit(
        &self,
        content_id: &str,
        text: &str,
        content_type: &str,
        title: &str,
        resource_key: &str,
    ) -> Result<Option<PipelineJob>, AppError> {
        if !self.config.enabled {
            return Ok(None);
        }

        if let Some(active) =
            PipelineJob::find_active_by_resource_key(resource_key, &self.db).await?
        {
            info!(job_id = %active.id, resource_key, "reusing active pipeline job");
            return Ok(Some(active));
        }

        let job = PipelineJob::new(
            resource_key.to_owned(),
            content_id.to_owned(),
            self.config.pipeline_version.clone(),
            serde_json::json!({
                "text": text,
                "content_type": content_type,
                "title": title,
            }),
        );

        match self.db.store_item(job.clone()).await {
            Ok(stored) => {
                Content::set_processing_status(content_id, ProcessingStatus::Pending, &self.db)
                    .await?;
                Ok(Some(stored.unwrap_or(job)))
            }
            // Two submitters can both miss the active-job lookup; the unique
            // index on active_key picks the winner and we return theirs.
            Err(e) => {
                if let Some(active) =
                    PipelineJob::find_active_by_resource_key(resource_key, &self.db).await?
                {
                    return Ok(Some(active));
                }
                Err(e.into())
            }
        }
    }

    /// Execute a claimed job through `entity_resolve` and `persist`.
    /// Cancellation is observed at stage boundaries; stage errors are
    /// recorded on the job and drive it to `failed`.
    pub async fn run_job(&self, job: PipelineJob) -> Result<(), AppError> {
        let job_id = job.id.clone();
        let content_id = job.content_id.clone();
        let text = job
            .metadata
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();
        let content_type = job
            .metadata
            .get("content_type")
            .and_then(|v| v.as_str())
            .unwrap_or("web")
            .to_owned();
        let title = job
            .metadata
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();

        let description_urls = self.description_urls(&content_id).await;

        let started = Instant::now();
        Content::set_processing_status(&content_id, ProcessingStatus::Processing, &self.db)
            .await?;

        if PipelineJob::is_cancelled(&job_id, &self.db).await? {
            info!(job_id, "job cancelled before resolution");
            return Ok(());
        }

        // Reprocessing converges: stale edges go before new ones are written.
        ContentEntityEdge::delete_by_content(&content_id, &self.db).await?;

        let stage_start = Instant::now();
        let outcome = match self
            .resolver
            .process_content(
                &content_id,
                &text,
                &content_type,
                &title,
                &description_urls,
                Some(&job_id),
            )
            .await
        {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                // Pipeline disabled between submit and claim; nothing to do.
                PipelineJob::mark_completed(&job_id, &self.db).await?;
                return Ok(());
            }
            Err(err) => {
                let stage_error = into_stage_error(err, "entity_resolve", "ENTITY_RESOLVE_ERROR");
                self.fail_job(&job_id, &content_id, stage_error.clone()).await?;
                return Err(stage_error.into());
            }
        };
        let resolve_ms = stage_start.elapsed().as_millis() as u64;

        if PipelineJob::is_cancelled(&job_id, &self.db).await? {
            info!(job_id, "job cancelled before persist; discarding results");
            return Ok(());
        }

        let stage_start = Instant::now();
        if let Err(err) = self.persist(&content_id, &text, &outcome.result).await {
            let stage_error = into_stage_error(err, "persist", "PERSIST_ERROR");
            self.fail_job(&job_id, &content_id, stage_error.clone()).await?;
            return Err(stage_error.into());
        }
        let persist_ms = stage_start.elapsed().as_millis() as u64;

        PipelineJob::mark_completed(&job_id, &self.db).await?;

        info!(
            job_id,
            content_id,
            resolve_ms,
            persist_ms,
            total_ms = started.elapsed().as_millis() as u64,
            edges = outcome.edges_created,
            "pipeline job completed"
        );

        self.deliver_webhook(&job_id, &content_id, &outcome.result)
            .await;

        Ok(())
    }

    async fn persist(
        &self,
        content_id: &str,
        text: &str,
        result: &crate::enricher::UnifiedResult,
    ) -> Result<(), AppError> {
        let embedded = chunking::embed_chunks(text, self.embedder.as_ref()).await?;
        Chunk::replace_for_content(content_id, embedded, &self.db).await?;

        linking::store_links(content_id, text, &self.db).await?;

        Content::apply_unified_result(
            content_id,
            serde_json::to_value(result)
                .map_err(|e| AppError::InternalError(format!("unserializable result: {e}")))?,
            result.tags.clone(),
            &result.tier,
            result.quality_score,
            &result.summary,
            &self.config.pipeline_version,
            &self.db,
        )
        .await
    }

    async fn fail_job(
        &self,
        job_id: &str,
        content_id: &str,
        error: StageError,
    ) -> Result<(), AppError> {
        warn!(job_id, content_id, error = %error, "pipeline job failed");
        PipelineJob::mark_failed(job_id, &error, &self.db).await?;
        Content::set_processing_status(content_id, ProcessingStatus::Failed, &self.db).await?;
        Ok(())
    }

    async fn description_urls(&self, content_id: &str) -> Vec<String> {
        match self.db.get_item::<Content>(content_id).await {
            Ok(Some(content)) => content
                .metadata
                .get("description_urls")
                .and_then(|v| v.as_array())
                .map(|urls| {
                    urls.iter()
                        .filter_map(|u| u.as_str())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// At-most-once webhook delivery of the final result; failures are
    /// logged and never retried.
    async fn deliver_webhook(
        &self,
        job_id: &str,
        content_id: &str,
        result: &crate::enricher::UnifiedResult,
    ) {
        let Some(url) = &self.config.webhook_url else {
            return;
        };

        let body = serde_json::json!({
            "job_id": job_id,
            "content_id": content_id,
            "status": "completed",
            "result": result,
        })
        .to_string();

        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.config.webhook_secret {
            let mut hasher = Sha256::new();
            hasher.update(secret.as_bytes());
            hasher.update(body.as_bytes());
            let signature = hasher.finalize();
            request = request.header("X-Signature", format!("sha256={signature:x}"));
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                info!(job_id, "webhook delivered");
            }
            Ok(response) => {
                warn!(job_id, status = %response.status(), "webhook rejected");
            }
            Err(e) => {
                warn!(job_id, error = %e, "webhook delivery failed");
            }
        }
    }
}

fn into_stage_error(err: AppError, stage: &'static str, code: &'static str) -> StageError {
    match err {
        AppError::Stage(stage_error) => stage_error,
        other => StageError::new(stage, code, other.to_string()),
    }
}

/// Claim-and-run loop for one worker. Sleeps briefly when the queue is
/// empty; claim errors back off harder.
pub async fn run_worker_loop(db: Arc<SurrealDbClient>, orchestrator: Arc<JobOrchestrator>) {
    let idle_backoff = std::time::Duration::from_millis(500);

    loop {
        match PipelineJob::claim_next_pending(&db).await {
            Ok(Some(job)) => {
                let job_id = job.id.clone();
                info!(%job_id, resource_key = %job.resource_key, "claimed pipeline job");
                if let Err(err) = orchestrator.run_job(job).await {
                    warn!(%job_id, error = %err, "pipeline job errored");
                }
            }
            Ok(None) => {
                tokio::time::sleep(idle_backoff).await;
            }
            Err(err) => {
                warn!(error = %err, "failed to claim pipeline job; backing off");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enricher::{EnricherConfig, UnifiedEnricher};
    use async_trait::async_trait;
    use common::llm::{GenerateOptions, Generator};
    use common::storage::types::content_link::ContentLink;
    use common::storage::types::pipeline_job::JobStatus;
    use common::utils::keyword_matcher::KeywordMatcher;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    struct StaticGenerator(String);

    #[async_trait]
    impl Generator for StaticGenerator {
        fn model_name(&self) -> &str {
            "static-test-model"
        }

        async fn generate(&self, _: &str, _: GenerateOptions) -> Result<String, AppError> {
            Ok(self.0.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing-test-model"
        }

        async fn generate(&self, _: &str, _: GenerateOptions) -> Result<String, AppError> {
            Err(AppError::InternalError("connection reset".into()))
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn dimensions(&self) -> u32 {
            3
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>, AppError> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    async fn initialized_db() -> Arc<SurrealDbClient> {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(3).await.expect("init schema");
        Arc::new(db)
    }

    fn orchestrator_with(
        db: Arc<SurrealDbClient>,
        generator: Arc<dyn Generator>,
        enabled: bool,
    ) -> JobOrchestrator {
        let enricher = Arc::new(UnifiedEnricher::new(generator, EnricherConfig::default()));
        let resolver = Arc::new(EntityResolver::new(
            Arc::clone(&db),
            enricher,
            Arc::new(RwLock::new(KeywordMatcher::new(0))),
            crate::resolver::ResolverFetchers::default(),
            false,
        ));
        JobOrchestrator::new(
            db,
            resolver,
            Arc::new(UnitEmbedder),
            OrchestratorConfig {
                enabled,
                pipeline_version: "1.0.0".into(),
                webhook_url: None,
                webhook_secret: None,
            },
        )
    }

    fn happy_response() -> String {
        serde_json::json!({
            "tags": ["rust"],
            "new_tags": [],
            "tier": "A",
            "quality_score": 80,
            "summary": "Summary.",
            "topics": [{"name": "Systems > Rust", "confidence": "high", "edge_type": "discusses"}],
            "pre_detected_validations": [],
            "additional_entities": []
        })
        .to_string()
    }

    async fn store_content(db: &SurrealDbClient, id: &str, resource_key: &str) {
        let mut content = Content::new(
            "web".into(),
            "A Page".into(),
            "text/markdown".into(),
            1,
            "web/x/content.md".into(),
            "caller".into(),
            vec![],
            serde_json::json!({ "resource_key": resource_key }),
        );
        content.id = id.to_owned();
        db.store_item(content).await.expect("store content");
    }

    #[tokio::test]
    async fn submit_returns_none_when_disabled() {
        let db = initialized_db().await;
        let orchestrator =
            orchestrator_with(Arc::clone(&db), Arc::new(StaticGenerator(happy_response())), false);

        let job = orchestrator
            .submit("c1", "text", "web", "Title", "url:abc")
            .await
            .expect("submit");
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn submit_deduplicates_by_resource_key() {
        let db = initialized_db().await;
        store_content(&db, "c1", "url:abc").await;
        let orchestrator =
            orchestrator_with(Arc::clone(&db), Arc::new(StaticGenerator(happy_response())), true);

        let first = orchestrator
            .submit("c1", "text", "web", "Title", "url:abc")
            .await
            .expect("submit")
            .expect("job");
        let second = orchestrator
            .submit("c1", "text", "web", "Title", "url:abc")
            .await
            .expect("submit")
            .expect("job");

        assert_eq!(first.id, second.id, "active job is reused");
        assert_eq!(second.status, JobStatus::Pending);

        let jobs = PipelineJob::list(None, 10, &db).await.expect("list");
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn run_job_completes_and_persists_everything() {
        let db = initialized_db().await;
        store_content(&db, "c1", "url:abc").await;
        let orchestrator =
            orchestrator_with(Arc::clone(&db), Arc::new(StaticGenerator(happy_response())), true);

        let job = orchestrator
            .submit("c1", "Body with a [[Wiki Link]] inside.", "web", "Title", "url:abc")
            .await
            .expect("submit")
            .expect("job");

        let claimed = PipelineJob::claim_next_pending(&db)
            .await
            .expect("claim")
            .expect("pending job");
        assert_eq!(claimed.id, job.id);

        orchestrator.run_job(claimed).await.expect("run");

        let finished: PipelineJob = db.get_item(&job.id).await.expect("get").expect("job");
        assert_eq!(finished.status, JobStatus::Completed);
        assert!(finished.finished_at.is_some());

        let content: Content = db.get_item("c1").await.expect("get").expect("content");
        assert_eq!(content.processing_status, ProcessingStatus::Completed);
        assert_eq!(content.tier.as_deref(), Some("A"));
        assert_eq!(content.tags, vec!["rust"]);
        assert_eq!(content.pipeline_version.as_deref(), Some("1.0.0"));

        let chunks = Chunk::get_by_content("c1", &db).await.expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);

        let links = ContentLink::get_by_source("c1", &db).await.expect("links");
        assert_eq!(links.len(), 1);

        let edges = ContentEntityEdge::get_by_content("c1", &db)
            .await
            .expect("edges");
        assert_eq!(edges.len(), 2, "two topic-chain edges");
    }

    #[tokio::test]
    async fn run_job_records_stage_errors() {
        let db = initialized_db().await;
        store_content(&db, "c1", "url:abc").await;
        let orchestrator = orchestrator_with(Arc::clone(&db), Arc::new(FailingGenerator), true);

        let job = orchestrator
            .submit("c1", "some text", "web", "Title", "url:abc")
            .await
            .expect("submit")
            .expect("job");
        let claimed = PipelineJob::claim_next_pending(&db)
            .await
            .expect("claim")
            .expect("job");

        let result = orchestrator.run_job(claimed).await;
        assert!(result.is_err());

        let failed: PipelineJob = db.get_item(&job.id).await.expect("get").expect("job");
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_stage.as_deref(), Some("llm_call"));
        assert_eq!(failed.error_code.as_deref(), Some("LLM_CALL_ERROR"));
        assert!(failed.finished_at.is_some());

        let content: Content = db.get_item("c1").await.expect("get").expect("content");
        assert_eq!(content.processing_status, ProcessingStatus::Failed);

        // The resource key is free again for an explicit reprocess.
        let resubmitted = orchestrator
            .submit("c1", "some text", "web", "Title", "url:abc")
            .await
            .expect("submit")
            .expect("job");
        assert_ne!(resubmitted.id, job.id);
    }

    #[tokio::test]
    async fn cancelled_job_discards_results_at_stage_boundary() {
        let db = initialized_db().await;
        store_content(&db, "c1", "url:abc").await;
        let orchestrator =
            orchestrator_with(Arc::clone(&db), Arc::new(StaticGenerator(happy_response())), true);

        let job = orchestrator
            .submit("c1", "some text", "web", "Title", "url:abc")
            .await
            .expect("submit")
            .expect("job");
        let claimed = PipelineJob::claim_next_pending(&db)
            .await
            .expect("claim")
            .expect("job");

        PipelineJob::cancel(&job.id, &db).await.expect("cancel");

        orchestrator.run_job(claimed).await.expect("run returns ok");

        let after: PipelineJob = db.get_item(&job.id).await.expect("get").expect("job");
        assert_eq!(after.status, JobStatus::Cancelled, "cancel flag survives");

        let chunks = Chunk::get_by_content("c1", &db).await.expect("chunks");
        assert!(chunks.is_empty(), "no persistence after cancellation");
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent_for_graph_state() {
        let db = initialized_db().await;
        store_content(&db, "c1", "url:abc").await;
        let orchestrator =
            orchestrator_with(Arc::clone(&db), Arc::new(StaticGenerator(happy_response())), true);

        let body = "Body text for chunking with a [[Wiki Link]].";

        for _ in 0..2 {
            let job = orchestrator
                .submit("c1", body, "web", "Title", "url:abc")
                .await
                .expect("submit")
                .expect("job");
            let claimed = PipelineJob::claim_next_pending(&db)
                .await
                .expect("claim")
                .expect("job");
            assert_eq!(claimed.id, job.id);
            orchestrator.run_job(claimed).await.expect("run");
        }

        let chunks = Chunk::get_by_content("c1", &db).await.expect("chunks");
        assert_eq!(chunks.len(), 1);
        let links = ContentLink::get_by_source("c1", &db).await.expect("links");
        assert_eq!(links.len(), 1);
        let edges = ContentEntityEdge::get_by_content("c1", &db)
            .await
            .expect("edges");
        assert_eq!(edges.len(), 2);
        // Entities accumulate across runs but stay deduplicated.
        let topics = common::storage::types::entity::Entity::list(
            Some(common::storage::types::entity::EntityType::Topic),
            10,
            0,
            &db,
        )
        .await
        .expect("topics");
        assert_eq!(topics.len(), 2);
    }
}
