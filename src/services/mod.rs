//! Long-running services and their supervision.

use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod manager;
pub mod refresher;
pub mod signals;
pub mod web;
pub mod workers;

/// A long-running component owned by the [`manager::ServiceManager`].
///
/// `run` should return once `shutdown_rx` fires. Returning earlier (with or
/// without an error) makes the whole application shut down.
#[async_trait]
pub trait Service: Send {
    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()>;
}
