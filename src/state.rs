//! Application state shared across components (web, refresher, workers).

use crate::reference::ReferenceStore;
use crate::tasks::TaskStore;
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Health status of a service.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Active,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    /// Returns the current status of a named service, if present.
    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status)
    }

    /// Returns a snapshot of all service statuses with seconds since their last change.
    pub fn all(&self) -> Vec<(String, ServiceStatus, u64)> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status,
                    entry.value().updated_at.elapsed().as_secs(),
                )
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskStore,
    pub reference: ReferenceStore,
    pub service_statuses: ServiceStatusRegistry,
    /// Where uploads are stored until a worker picks them up.
    pub work_dir: Arc<PathBuf>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        tasks: TaskStore,
        reference: ReferenceStore,
        work_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            tasks,
            reference,
            service_statuses: ServiceStatusRegistry::new(),
            work_dir: Arc::new(work_dir),
            max_upload_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_overwrites_previous_status() {
        let registry = ServiceStatusRegistry::new();
        assert_eq!(registry.get("web"), None);

        registry.set("web", ServiceStatus::Starting);
        registry.set("web", ServiceStatus::Active);

        assert_eq!(registry.get("web"), Some(ServiceStatus::Active));
        assert_eq!(registry.all().len(), 1);
    }
}
