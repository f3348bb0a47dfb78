use crate::calendar::{Calendar, CalendarError};
use crate::enrich::{EnrichStats, enrich_event, progress_percent};
use crate::reference::ReferenceStore;
use crate::tasks::store::{Completion, TaskLease, TaskStore};
use crate::utils::{fmt_duration, log_if_slow};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time;
use tracing::{Instrument, debug, error, info, trace, warn};

/// Events processed between two pacing pauses.
const PACING_EVERY: usize = 10;

/// Fallback wake-up for idle workers in case a notification is missed.
const IDLE_POLL: Duration = Duration::from_secs(5);

const SLOW_THRESHOLD: Duration = Duration::from_secs(30);

/// File name suffix of stored uploads, `<ulid>_upload.ics`.
pub const UPLOAD_SUFFIX: &str = "_upload.ics";
/// File name suffix of enriched results, `<task_id>_output.ics`.
pub const OUTPUT_SUFFIX: &str = "_output.ics";

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Directory receiving `<task_id>_output.ics` artifacts.
    pub work_dir: PathBuf,
    /// Pause after every [`PACING_EVERY`] events.
    pub pacing_delay: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to read upload {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("upload is not a valid calendar")]
    Parse(#[from] CalendarError),
    #[error("failed to write result {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single enrichment worker.
///
/// Claims one task at a time from the [`TaskStore`] and runs it to completion.
pub struct Worker {
    id: usize,
    tasks: TaskStore,
    reference: ReferenceStore,
    settings: Arc<WorkerSettings>,
}

impl Worker {
    pub fn new(
        id: usize,
        tasks: TaskStore,
        reference: ReferenceStore,
        settings: Arc<WorkerSettings>,
    ) -> Self {
        Self {
            id,
            tasks,
            reference,
            settings,
        }
    }

    /// Runs the worker's main loop.
    ///
    /// Shutdown is only observed between tasks; a task that has been claimed
    /// is finished first.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(worker_id = self.id, "Worker started");

        loop {
            let Some(lease) = self.tasks.claim_next() else {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(worker_id = self.id, "Worker received shutdown signal, exiting gracefully");
                        break;
                    }
                    _ = self.tasks.notified() => {}
                    _ = time::sleep(IDLE_POLL) => {
                        trace!(worker_id = self.id, "No tasks available, polling again");
                    }
                }
                continue;
            };

            self.handle(lease).await;

            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                info!(worker_id = self.id, "Worker received shutdown signal, exiting gracefully");
                break;
            }
        }
    }

    async fn handle(&self, lease: TaskLease) {
        let task_id = lease.id();
        let source_path = lease.source_path().to_path_buf();
        let start = Instant::now();
        let span = tracing::info_span!("process_task", worker_id = self.id, %task_id);

        let result = self.process(&lease).instrument(span).await;
        let duration = start.elapsed();

        let completion = match result {
            Ok((output_path, stats)) => {
                info!(
                    worker_id = self.id,
                    %task_id,
                    events = stats.total,
                    matched = stats.matched,
                    approximate = stats.approximate,
                    unmatched = stats.unmatched,
                    duration = fmt_duration(duration),
                    "Task completed"
                );
                lease.succeed(output_path)
            }
            Err(e) => {
                error!(
                    worker_id = self.id,
                    %task_id,
                    error = ?e,
                    duration = fmt_duration(duration),
                    "Error processing task"
                );
                lease.fail()
            }
        };
        log_if_slow(start, SLOW_THRESHOLD, "calendar enrichment");

        if let Completion::Recorded { expired } = completion {
            for path in expired {
                remove_file_logged(&path).await;
            }
        }
        remove_file_logged(&source_path).await;
    }

    async fn process(&self, lease: &TaskLease) -> Result<(PathBuf, EnrichStats), ProcessError> {
        let source_path = lease.source_path();
        let input = fs::read_to_string(source_path)
            .await
            .map_err(|source| ProcessError::Read {
                path: source_path.to_path_buf(),
                source,
            })?;

        let mut calendar = Calendar::parse(&input)?;
        let table = self.reference.snapshot();

        let events = calendar.events_mut();
        let total = events.len();
        debug!(events = total, reference_rows = table.len(), "Enriching calendar");

        let mut stats = EnrichStats::default();
        for (index, event) in events.into_iter().enumerate() {
            stats.record(enrich_event(event, &table));

            let processed = index + 1;
            lease.set_progress(progress_percent(processed, total));
            if processed % PACING_EVERY == 0 {
                time::sleep(self.settings.pacing_delay).await;
            }
        }

        let output_path = self
            .settings
            .work_dir
            .join(format!("{}{OUTPUT_SUFFIX}", lease.id()));
        fs::write(&output_path, calendar.serialize())
            .await
            .map_err(|source| ProcessError::Write {
                path: output_path.clone(),
                source,
            })?;

        Ok((output_path, stats))
    }
}

/// Removes uploads and results left in `work_dir` by an earlier process.
///
/// Nothing tracks those files after a restart, so they would never expire.
pub async fn sweep_work_dir(work_dir: &Path) -> io::Result<usize> {
    let mut entries = fs::read_dir(work_dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !(name.ends_with(UPLOAD_SUFFIX) || name.ends_with(OUTPUT_SUFFIX)) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            remove_file_logged(&entry.path()).await;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn remove_file_logged(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => trace!(path = %path.display(), "Removed file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = ?e, "Failed to remove file"),
    }
}
