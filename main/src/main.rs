mod runtime;

use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::utils::config::get_config;
use ingestion_pipeline::run_worker_loop;
use tracing::{error, info};

/// Combined binary: HTTP surface and pipeline workers in one process.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime::init_tracing();

    let config = get_config()?;
    let concurrency = config.worker_concurrency.max(1);
    let services = runtime::build_services(config).await?;

    let api_state = ApiState::new(
        Arc::clone(&services.db),
        services.config.clone(),
        services.blob.clone(),
        Arc::clone(&services.ingestor),
        Arc::clone(&services.orchestrator),
        Arc::clone(&services.retriever),
    );

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    for _ in 0..concurrency {
        let db = Arc::clone(&services.db);
        let orchestrator = Arc::clone(&services.orchestrator);
        tokio::spawn(run_worker_loop(db, orchestrator));
    }
    info!(concurrency, "pipeline workers started");

    info!(
        "Starting server listening on 0.0.0.0:{}",
        services.config.http_port
    );
    let serve_address = format!("0.0.0.0:{}", services.config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {e}");
    }

    Ok(())
}
