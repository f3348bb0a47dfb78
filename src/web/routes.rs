//! Web API router construction.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
};

use std::time::Duration;

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{status, tasks};
use tower_http::timeout::TimeoutLayer;

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .with_state(app_state.clone());

    let body_limit = app_state.max_upload_bytes;
    let router = Router::new()
        .route("/", post(tasks::upload))
        .route("/status/{task_id}", get(tasks::task_status))
        .route("/download/{task_id}", get(tasks::download))
        .route("/health", get(status::health))
        .nest("/api", api_router)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state);

    router.layer((
        // Outermost: per-request ID span + severity-proportional response logging.
        RequestIdLayer,
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(60)),
    ))
}
