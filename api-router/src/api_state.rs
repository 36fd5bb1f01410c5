use std::sync::Arc;

use common::{
    storage::{blob::BlobStore, db::SurrealDbClient},
    utils::config::AppConfig,
};
use ingestion_pipeline::{Ingestor, JobOrchestrator};
use retrieval_pipeline::AgenticRetriever;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub blob: BlobStore,
    pub ingestor: Arc<Ingestor>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub retriever: Arc<AgenticRetriever>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        blob: BlobStore,
        ingestor: Arc<Ingestor>,
        orchestrator: Arc<JobOrchestrator>,
        retriever: Arc<AgenticRetriever>,
    ) -> Self {
        Self {
            db,
            config,
            blob,
            ingestor,
            orchestrator,
            retriever,
        }
    }
}
