use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, orchestrator, posting};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Orchestrator
        .route("/orchestrator/status", get(orchestrator::get_status))
        .route("/orchestrator/upcoming", get(orchestrator::get_upcoming))
        .route("/orchestrator/start", post(orchestrator::start))
        .route("/orchestrator/stop", post(orchestrator::stop))
        .route("/orchestrator/force-stop", post(orchestrator::force_stop))
        .route("/orchestrator/reset-errors", post(orchestrator::reset_errors))
        .route("/orchestrator/sync", post(orchestrator::trigger_sync))
        // Posting controls
        .route(
            "/posting/gate",
            get(posting::get_gate).put(posting::set_gate),
        )
        .route(
            "/posting/settings",
            get(posting::get_settings).put(posting::set_settings),
        )
        .route("/posting/quota", get(posting::get_quota));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(metrics_middleware)),
        )
        .with_state(state)
}
