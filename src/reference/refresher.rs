//! Periodic refresh of the classroom reference table.
//!
//! Each cycle fetches the finder page with a bounded, fixed-delay retry
//! budget. A cycle that cannot produce rows leaves the current table in
//! place: stale data keeps serving lookups until the next cycle succeeds.

use crate::data::classrooms;
use crate::reference::parse::parse_classroom_table;
use crate::reference::source::ReferenceSource;
use crate::reference::store::ReferenceStore;
use crate::utils::fmt_duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Fixed-delay retry budget for a single refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts per cycle, including the first.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new table with this many rows was installed.
    Updated { rows: usize },
    /// Nothing usable was fetched; the previous table is still in place.
    Stale,
}

/// Keeps a [`ReferenceStore`] up to date from a [`ReferenceSource`].
pub struct Refresher {
    source: Arc<dyn ReferenceSource>,
    store: ReferenceStore,
    db_pool: Option<SqlitePool>,
    retry: RetryPolicy,
    interval: Duration,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn ReferenceSource>,
        store: ReferenceStore,
        retry: RetryPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            db_pool: None,
            retry,
            interval,
        }
    }

    /// Also persist every freshly installed table to the `classrooms` table.
    pub fn with_db_pool(mut self, db_pool: Option<SqlitePool>) -> Self {
        self.db_pool = db_pool;
        self
    }

    /// Runs refresh cycles until a shutdown signal arrives.
    ///
    /// The first cycle starts immediately; each following cycle starts
    /// `interval` after the previous one finished.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            source = self.source.describe(),
            interval = fmt_duration(self.interval),
            "Reference refresher started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Refresher received shutdown signal during refresh");
                    break;
                }
                _ = self.refresh_once() => {}
            }

            debug!(
                interval = fmt_duration(self.interval),
                "Sleeping before the next refresh"
            );
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Refresher received shutdown signal, exiting gracefully");
                    break;
                }
                _ = time::sleep(self.interval) => {}
            }
        }
    }

    /// Fetch, parse and install the reference table once.
    ///
    /// Never fails: exhausted retries and empty parses are logged and
    /// reported as [`RefreshOutcome::Stale`].
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let start = Instant::now();

        let Some(body) = self.fetch_with_retry().await else {
            error!(
                kept_rows = self.store.snapshot().len(),
                "Failed to fetch classroom data after multiple retries, keeping current table"
            );
            return RefreshOutcome::Stale;
        };

        let rows = parse_classroom_table(&body);
        if rows.is_empty() {
            warn!(
                bytes = body.len(),
                kept_rows = self.store.snapshot().len(),
                "Fetched page contained no classroom rows, keeping current table"
            );
            return RefreshOutcome::Stale;
        }

        if let Some(pool) = &self.db_pool
            && let Err(e) = classrooms::replace_all(pool, &rows).await
        {
            warn!(error = ?e, "Failed to persist classroom data");
        }

        debug!(sample = ?rows.iter().take(3).collect::<Vec<_>>(), "Parsed classroom rows");
        let count = self.store.replace(rows);
        info!(
            rows = count,
            duration = fmt_duration(start.elapsed()),
            "Classroom data refreshed"
        );
        RefreshOutcome::Updated { rows: count }
    }

    async fn fetch_with_retry(&self) -> Option<String> {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, "Fetching classroom data");
            match self.source.fetch().await {
                Ok(body) => return Some(body),
                Err(e) => {
                    let remaining = max_attempts - attempt;
                    warn!(attempt, max_attempts, remaining, error = ?e, "Error fetching classroom data");
                    if remaining > 0 {
                        time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceRow;
    use crate::reference::source::FetchError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAGE: &str = r#"<table id="tablepress-16"><tbody>
        <tr><td class="column-1">NET.01.101 - Lecture Hall</td>
            <td class="column-2">Dept. of Cardiology, 1094 Budapest Tömő 25-29</td></tr>
    </tbody></table>"#;

    /// Replays scripted responses; once exhausted, every fetch fails.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<String, u16>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<&str, u16>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_owned))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReferenceSource for ScriptedSource {
        async fn fetch(&self) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front().unwrap_or(Err(503));
            next.map_err(|status| FetchError::Status {
                url: "scripted".into(),
                status,
            })
        }

        fn describe(&self) -> &str {
            "scripted"
        }
    }

    fn refresher(source: Arc<ScriptedSource>, store: ReferenceStore) -> Refresher {
        Refresher::new(
            source,
            store,
            RetryPolicy::default(),
            Duration::from_secs(3600),
        )
    }

    fn stale_row() -> ReferenceRow {
        ReferenceRow::new("OLD.1", "", "", "1000 Old Street")
    }

    #[tokio::test(start_paused = true)]
    async fn successful_fetch_installs_table() {
        let source = ScriptedSource::new(vec![Ok(PAGE)]);
        let store = ReferenceStore::new();

        let outcome = refresher(source.clone(), store.clone()).refresh_once().await;

        assert_eq!(outcome, RefreshOutcome::Updated { rows: 1 });
        assert_eq!(source.calls(), 1);
        assert_eq!(store.snapshot().rows()[0].code, "NET.01.101");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_fixed_delay() {
        let source = ScriptedSource::new(vec![Err(500), Err(502), Ok(PAGE)]);
        let store = ReferenceStore::new();

        let start = time::Instant::now();
        let outcome = refresher(source.clone(), store.clone()).refresh_once().await;

        assert_eq!(outcome, RefreshOutcome::Updated { rows: 1 });
        assert_eq!(source.calls(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_keep_stale_table() {
        let source = ScriptedSource::new(vec![]);
        let store = ReferenceStore::new();
        store.replace(vec![stale_row()]);

        let start = time::Instant::now();
        let outcome = refresher(source.clone(), store.clone()).refresh_once().await;

        assert_eq!(outcome, RefreshOutcome::Stale);
        assert_eq!(source.calls(), 5);
        // Four pauses between five attempts, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));
        assert_eq!(store.snapshot().rows(), &[stale_row()]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_keeps_stale_table() {
        let source = ScriptedSource::new(vec![Ok("<html></html>")]);
        let store = ReferenceStore::new();
        store.replace(vec![stale_row()]);

        let outcome = refresher(source, store.clone()).refresh_once().await;

        assert_eq!(outcome, RefreshOutcome::Stale);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_refreshes_on_interval_until_shutdown() {
        let source = ScriptedSource::new(vec![Ok(PAGE), Ok(PAGE), Ok(PAGE)]);
        let store = ReferenceStore::new();
        let refresher = Arc::new(refresher(source.clone(), store.clone()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.run(shutdown_rx).await }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(source.calls(), 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn successful_refresh_is_persisted() {
        let pool = crate::data::connect("sqlite::memory:").await.unwrap();
        let source = ScriptedSource::new(vec![Ok(PAGE)]);
        let store = ReferenceStore::new();

        refresher(source, store)
            .with_db_pool(Some(pool.clone()))
            .refresh_once()
            .await;

        let persisted = classrooms::get_all(&pool).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].address, "1094 Budapest Tömő 25-29");
    }
}
