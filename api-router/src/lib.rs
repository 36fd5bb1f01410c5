use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    content::{
        delete_content, get_content, get_content_body, list_content, patch_content,
        reprocess_content, upload_content,
    },
    entities::{
        delete_entity, find_duplicates, get_entity, get_entity_content, list_entities,
        patch_entity, topic_hierarchy,
    },
    graph::{graph, neighborhood},
    ingest::ingest_url,
    jobs::{cancel_job, drift_report, get_job, list_jobs},
    liveness::live,
    readiness::ready,
    search::{agentic_search, search},
    tags::list_tags,
};

pub mod api_state;
pub mod error;
pub mod middleware_api_auth;
mod routes;

const UPLOAD_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require auth)
    let protected = Router::new()
        .route("/ingest", post(ingest_url))
        .route(
            "/content",
            get(list_content)
                .post(upload_content)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/content/{id}",
            get(get_content).patch(patch_content).delete(delete_content),
        )
        .route("/content/{id}/content", get(get_content_body))
        .route("/content/{id}/reprocess", post(reprocess_content))
        .route("/entities", get(list_entities))
        .route("/entities/topics", get(topic_hierarchy))
        .route("/entities/duplicates", get(find_duplicates))
        .route(
            "/entities/{id}",
            get(get_entity).patch(patch_entity).delete(delete_entity),
        )
        .route("/entities/{id}/content", get(get_entity_content))
        .route("/search", post(search))
        .route("/search/agentic", post(agentic_search))
        .route("/graph", get(graph))
        .route("/graph/neighborhood/{id}", get(neighborhood))
        .route("/jobs", get(list_jobs))
        .route("/jobs/drift", get(drift_report))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/tags", get(list_tags))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
