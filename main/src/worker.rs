mod runtime;

use std::sync::Arc;

use common::utils::config::get_config;
use ingestion_pipeline::run_worker_loop;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime::init_tracing();

    let config = get_config()?;
    let concurrency = config.worker_concurrency.max(1);
    let services = runtime::build_services(config).await?;

    info!(concurrency, "starting pipeline workers");

    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let db = Arc::clone(&services.db);
        let orchestrator = Arc::clone(&services.orchestrator);
        handles.push(tokio::spawn(run_worker_loop(db, orchestrator)));
    }

    futures::future::join_all(handles).await;
    Ok(())
}
