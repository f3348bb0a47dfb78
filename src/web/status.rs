//! Health and status handlers.

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::trace;

use crate::state::{AppState, ServiceStatus};
use crate::tasks::TaskStats;

#[derive(Serialize)]
pub struct ServiceInfo {
    status: ServiceStatus,
    since_secs: u64,
}

#[derive(Serialize)]
pub struct ReferenceInfo {
    rows: usize,
    loaded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    services: BTreeMap<String, ServiceInfo>,
    reference: ReferenceInfo,
    tasks: TaskStats,
}

/// Health check endpoint
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Status endpoint showing service health, reference data and queue depth
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let services: BTreeMap<_, _> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, since_secs)| (name, ServiceInfo { status, since_secs }))
        .collect();

    let overall_status = if services
        .values()
        .any(|s| matches!(s.status, ServiceStatus::Error))
    {
        ServiceStatus::Error
    } else if services.is_empty() {
        ServiceStatus::Disabled
    } else if services
        .values()
        .all(|s| matches!(s.status, ServiceStatus::Active))
    {
        ServiceStatus::Active
    } else {
        ServiceStatus::Starting
    };

    let table = state.reference.snapshot();

    Json(StatusResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        services,
        reference: ReferenceInfo {
            rows: table.len(),
            loaded_at: table.loaded_at(),
        },
        tasks: state.tasks.stats(),
    })
}
