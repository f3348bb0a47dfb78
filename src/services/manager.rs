use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};
use crate::utils::fmt_duration;
use futures::future::select_all;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a service's task ended.
#[derive(Debug)]
pub enum ServiceExit {
    /// `run` returned `Ok`.
    Completed,
    /// `run` returned an error.
    Failed(anyhow::Error),
    /// The task panicked or was aborted.
    Crashed(String),
}

/// Spawns registered services and coordinates their shutdown.
pub struct ServiceManager {
    registered: Vec<(&'static str, Box<dyn Service>)>,
    running: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
    shutdown_tx: broadcast::Sender<()>,
    statuses: ServiceStatusRegistry,
}

impl ServiceManager {
    pub fn new(statuses: ServiceStatusRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registered: Vec::new(),
            running: Vec::new(),
            shutdown_tx,
            statuses,
        }
    }

    pub fn register_service(&mut self, name: &'static str, service: Box<dyn Service>) {
        self.statuses.set(name, ServiceStatus::Starting);
        self.registered.push((name, service));
    }

    pub fn has_services(&self) -> bool {
        !self.registered.is_empty() || !self.running.is_empty()
    }

    /// Spawn every registered service on its own task.
    pub fn spawn_all(&mut self) {
        for (name, mut service) in self.registered.drain(..) {
            let shutdown_rx = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(async move { service.run(shutdown_rx).await });
            self.statuses.set(name, ServiceStatus::Active);
            debug!(service = name, "Service spawned");
            self.running.push((name, handle));
        }
        info!(count = self.running.len(), "All services spawned");
    }

    /// Wait for the first running service to exit.
    ///
    /// Never resolves when nothing is running.
    pub async fn next_exit(&mut self) -> (&'static str, ServiceExit) {
        if self.running.is_empty() {
            return std::future::pending().await;
        }

        let (result, index, _) = select_all(self.running.iter_mut().map(|(_, handle)| handle)).await;
        let (name, _) = self.running.remove(index);
        let exit = Self::classify(result);
        self.record_exit(name, &exit);
        (name, exit)
    }

    /// Broadcast shutdown and wait up to `timeout` for every service to stop.
    ///
    /// Returns the names of services that had to be aborted.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<Duration, Vec<&'static str>> {
        let start = Instant::now();
        let _ = self.shutdown_tx.send(());
        info!(
            services = self.running.len(),
            timeout = fmt_duration(timeout),
            "Shutting down services"
        );

        let running = std::mem::take(&mut self.running);
        let names: Vec<_> = running.iter().map(|(name, _)| *name).collect();
        let mut handles: Vec<_> = running.into_iter().map(|(_, handle)| handle).collect();

        let wait_all = async {
            for (name, handle) in names.iter().zip(handles.iter_mut()) {
                let exit = Self::classify(handle.await);
                self.record_exit(name, &exit);
            }
        };

        if tokio::time::timeout(timeout, wait_all).await.is_ok() {
            let elapsed = start.elapsed();
            info!(duration = fmt_duration(elapsed), "All services shut down");
            return Ok(elapsed);
        }

        let stuck: Vec<_> = names
            .iter()
            .zip(handles.iter())
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| *name)
            .collect();
        for handle in &handles {
            handle.abort();
        }
        for name in &stuck {
            self.statuses.set(name, ServiceStatus::Error);
        }
        Err(stuck)
    }

    fn classify(result: Result<anyhow::Result<()>, tokio::task::JoinError>) -> ServiceExit {
        match result {
            Ok(Ok(())) => ServiceExit::Completed,
            Ok(Err(e)) => ServiceExit::Failed(e),
            Err(e) => ServiceExit::Crashed(e.to_string()),
        }
    }

    fn record_exit(&self, name: &str, exit: &ServiceExit) {
        match exit {
            ServiceExit::Completed => {
                debug!(service = name, "Service exited");
                self.statuses.set(name, ServiceStatus::Disabled);
            }
            ServiceExit::Failed(e) => {
                error!(service = name, error = ?e, "Service failed");
                self.statuses.set(name, ServiceStatus::Error);
            }
            ServiceExit::Crashed(reason) => {
                warn!(service = name, reason = %reason, "Service task crashed");
                self.statuses.set(name, ServiceStatus::Error);
            }
        }
    }
}
