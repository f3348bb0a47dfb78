use crate::reference::ReferenceStore;
use crate::services::Service;
use crate::tasks::{TaskStore, Worker, WorkerSettings};
use crate::utils::fmt_duration;
use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// A fixed pool of enrichment workers sharing one task store.
///
/// Each worker runs on its own task. A worker that panics is replaced, so a
/// single bad document never takes the pool down.
pub struct WorkerPoolService {
    workers: Vec<Arc<Worker>>,
    reference: ReferenceStore,
    startup_wait: Duration,
}

impl WorkerPoolService {
    pub fn new(
        count: usize,
        tasks: TaskStore,
        reference: ReferenceStore,
        settings: WorkerSettings,
        startup_wait: Duration,
    ) -> Self {
        let settings = Arc::new(settings);
        let workers = (0..count.max(1))
            .map(|id| {
                Arc::new(Worker::new(
                    id,
                    tasks.clone(),
                    reference.clone(),
                    settings.clone(),
                ))
            })
            .collect();
        Self {
            workers,
            reference,
            startup_wait,
        }
    }
}

#[async_trait]
impl Service for WorkerPoolService {
    async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        // Hold off until the first refresh lands.
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            loaded = self.reference.wait_until_loaded(self.startup_wait) => {
                if !loaded {
                    warn!(
                        waited = fmt_duration(self.startup_wait),
                        "Reference table still empty, starting workers anyway"
                    );
                }
            }
        }

        info!(workers = self.workers.len(), "Starting worker pool");
        let workers = self.workers.clone();
        supervise(
            workers.len(),
            move |id, rx| {
                let worker = workers[id].clone();
                tokio::spawn(async move { worker.run(rx).await })
            },
            shutdown_rx,
        )
        .await;
        info!("All workers stopped");
        Ok(())
    }
}

type Running = FuturesUnordered<BoxFuture<'static, (usize, Result<(), JoinError>)>>;

fn track(running: &Running, id: usize, handle: JoinHandle<()>) {
    running.push(Box::pin(async move { (id, handle.await) }));
}

/// Keeps `count` spawned workers alive until shutdown.
///
/// Workers that exit or panic before shutdown is signalled are respawned.
/// Returns once every worker has exited after shutdown.
async fn supervise<F>(count: usize, spawn: F, mut shutdown_rx: broadcast::Receiver<()>)
where
    F: Fn(usize, broadcast::Receiver<()>) -> JoinHandle<()>,
{
    // Workers subscribe here rather than to the service channel so a worker
    // spawned late still sees the stop signal.
    let (stop_tx, _) = broadcast::channel(1);
    let mut running = Running::new();
    for id in 0..count {
        track(&running, id, spawn(id, stop_tx.subscribe()));
    }

    let mut stopping = false;
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv(), if !stopping => {
                stopping = true;
                let _ = stop_tx.send(());
            }
            Some((id, result)) = running.next() => {
                match result {
                    Ok(()) if stopping => continue,
                    Ok(()) => {
                        warn!(worker_id = id, "Worker exited before shutdown, restarting");
                    }
                    Err(e) if e.is_panic() => {
                        error!(worker_id = id, error = ?e, "Worker panicked");
                    }
                    Err(e) => {
                        warn!(worker_id = id, error = ?e, "Worker task cancelled");
                    }
                }
                if !stopping {
                    track(&running, id, spawn(id, stop_tx.subscribe()));
                    info!(worker_id = id, "Worker restarted");
                }
            }
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn panicking_worker_is_restarted_until_shutdown() {
        let spawned = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let supervisor = tokio::spawn({
            let spawned = spawned.clone();
            supervise(
                2,
                move |id, mut rx| {
                    let attempt = spawned.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        // Worker 0 dies on its first run only.
                        if id == 0 && attempt == 0 {
                            panic!("bad document");
                        }
                        let _ = rx.recv().await;
                    })
                },
                shutdown_rx,
            )
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while spawned.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!supervisor.is_finished());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), supervisor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(spawned.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn shutdown_waits_for_every_worker() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let finished = Arc::new(AtomicUsize::new(0));

        let supervisor = tokio::spawn({
            let finished = finished.clone();
            supervise(
                3,
                move |_, mut rx| {
                    let finished = finished.clone();
                    tokio::spawn(async move {
                        let _ = rx.recv().await;
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    })
                },
                shutdown_rx,
            )
        });

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), supervisor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }
}
