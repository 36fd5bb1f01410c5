#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunking;
pub mod enricher;
pub mod fetchers;
pub mod ingest;
pub mod linking;
pub mod orchestrator;
pub mod resolver;

pub use enricher::{EnricherConfig, UnifiedEnricher, UnifiedResult};
pub use ingest::{IngestOutcome, Ingestor};
pub use orchestrator::{run_worker_loop, JobOrchestrator, OrchestratorConfig};
pub use resolver::EntityResolver;
