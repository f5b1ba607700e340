use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{capabilities, handlers, middleware::metrics_middleware, process};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/queues", get(handlers::list_queues))
        .route("/metrics", get(handlers::metrics))
        // Processing
        .route("/images/process", post(process::process_images))
        .route("/audio/process", post(process::process_audio))
        .route("/video/process", post(process::process_video))
        // Capabilities
        .route("/capabilities/encoders", get(capabilities::list_encoders))
        .route("/capabilities/filters", get(capabilities::list_filters))
        .route("/capabilities/formats", get(capabilities::list_formats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
