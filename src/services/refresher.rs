use crate::reference::Refresher;
use crate::services::Service;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Keeps the classroom reference table fresh for the lifetime of the process.
pub struct RefresherService {
    refresher: Refresher,
}

impl RefresherService {
    pub fn new(refresher: Refresher) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl Service for RefresherService {
    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        self.refresher.run(shutdown_rx).await;
        Ok(())
    }
}
