//! Task bookkeeping: pending queue, progress and finished results.
//!
//! A task moves `PENDING -> SUCCESS | FAILURE` exactly once. Pending tasks are
//! kept in submission order; when there are more than `capacity` of them the
//! oldest ones that no worker has claimed yet are evicted. Claimed (in-flight)
//! tasks are never evicted, so a worker always has somewhere to report to.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::{debug, warn};
use ulid::Ulid;

/// Opaque, unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Success,
    Failure,
    /// The id was never issued, or has since been evicted or expired.
    Unknown,
}

/// What `GET /status/{id}` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub progress: u8,
}

/// How processing ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(PathBuf),
    Failure,
}

/// A pending task dropped to make room for newer submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedTask {
    pub id: TaskId,
    pub source_path: PathBuf,
}

#[derive(Debug)]
pub struct Submission {
    pub id: TaskId,
    /// Uploads belonging to evicted tasks, to be deleted by the caller.
    pub evicted: Vec<EvictedTask>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// The terminal state was recorded. `expired` lists result artifacts of
    /// older tasks that fell out of the retention window.
    Recorded { expired: Vec<PathBuf> },
    /// The task was not pending (already finished, evicted or unknown).
    NotPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
}

#[derive(Debug)]
struct PendingTask {
    source_path: PathBuf,
    progress: u8,
    claimed: bool,
}

#[derive(Debug)]
enum FinishedTask {
    Success { result_path: PathBuf },
    Failure { progress: u8 },
}

#[derive(Debug, Default)]
struct Inner {
    pending: IndexMap<TaskId, PendingTask>,
    finished: IndexMap<TaskId, FinishedTask>,
}

/// Shared task registry. Clone-cheap.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    capacity: usize,
    result_capacity: usize,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("capacity", &self.capacity)
            .field("result_capacity", &self.result_capacity)
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    pub fn new(capacity: usize, result_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
            capacity: capacity.max(1),
            result_capacity: result_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the maps consistent, so a poisoned
        // lock is still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a new task for `source_path` and wake an idle worker.
    pub fn submit(&self, source_path: PathBuf) -> Submission {
        let id = TaskId::new();
        let mut evicted = Vec::new();

        {
            let mut inner = self.lock();
            inner.pending.insert(
                id,
                PendingTask {
                    source_path,
                    progress: 0,
                    claimed: false,
                },
            );

            while inner.pending.len() > self.capacity {
                let Some(index) = inner
                    .pending
                    .iter()
                    .position(|(pending_id, task)| !task.claimed && *pending_id != id)
                else {
                    break;
                };
                if let Some((old_id, task)) = inner.pending.shift_remove_index(index) {
                    evicted.push(EvictedTask {
                        id: old_id,
                        source_path: task.source_path,
                    });
                }
            }
        }

        for task in &evicted {
            warn!(task_id = %task.id, "Evicted pending task over capacity");
        }
        self.notify.notify_one();

        Submission { id, evicted }
    }

    /// Claim the oldest unclaimed pending task.
    pub fn claim_next(&self) -> Option<TaskLease> {
        let mut inner = self.lock();
        let (id, task) = inner.pending.iter_mut().find(|(_, task)| !task.claimed)?;
        task.claimed = true;

        Some(TaskLease {
            store: self.clone(),
            id: *id,
            source_path: task.source_path.clone(),
            finished: false,
        })
    }

    /// Record progress for a pending task. Progress never decreases and is
    /// capped at 100. Returns `false` if the task is not pending.
    pub fn set_progress(&self, id: TaskId, progress: u8) -> bool {
        let mut inner = self.lock();
        match inner.pending.get_mut(&id) {
            Some(task) => {
                task.progress = task.progress.max(progress.min(100));
                true
            }
            None => false,
        }
    }

    /// Move a pending task into its terminal state.
    pub fn complete(&self, id: TaskId, outcome: TaskOutcome) -> Completion {
        let mut inner = self.lock();
        let Some(task) = inner.pending.shift_remove(&id) else {
            return Completion::NotPending;
        };

        let finished = match outcome {
            TaskOutcome::Success(result_path) => FinishedTask::Success { result_path },
            TaskOutcome::Failure => FinishedTask::Failure {
                progress: task.progress,
            },
        };
        inner.finished.insert(id, finished);

        let mut expired = Vec::new();
        while inner.finished.len() > self.result_capacity {
            if let Some((_, FinishedTask::Success { result_path })) = inner.finished.shift_remove_index(0) {
                expired.push(result_path);
            }
        }

        debug!(task_id = %id, "Task completed");
        Completion::Recorded { expired }
    }

    pub fn status(&self, id: TaskId) -> TaskStatus {
        let inner = self.lock();
        if let Some(task) = inner.pending.get(&id) {
            return TaskStatus {
                state: TaskState::Pending,
                progress: task.progress,
            };
        }
        match inner.finished.get(&id) {
            Some(FinishedTask::Success { .. }) => TaskStatus {
                state: TaskState::Success,
                progress: 100,
            },
            Some(FinishedTask::Failure { progress }) => TaskStatus {
                state: TaskState::Failure,
                progress: *progress,
            },
            None => TaskStatus {
                state: TaskState::Unknown,
                progress: 0,
            },
        }
    }

    /// Location of the finished artifact, only for successful tasks.
    pub fn result_path(&self, id: TaskId) -> Option<PathBuf> {
        match self.lock().finished.get(&id) {
            Some(FinishedTask::Success { result_path }) => Some(result_path.clone()),
            _ => None,
        }
    }

    pub fn stats(&self) -> TaskStats {
        let inner = self.lock();
        TaskStats {
            pending: inner.pending.len(),
            in_flight: inner.pending.values().filter(|t| t.claimed).count(),
            completed: inner.finished.len(),
        }
    }

    /// Resolves after the next [`submit`](Self::submit), or immediately if a
    /// submission happened while nobody was waiting.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

/// Exclusive right to process one claimed task.
///
/// Dropping a lease without calling [`succeed`](Self::succeed) or
/// [`fail`](Self::fail) records the task as failed.
#[derive(Debug)]
pub struct TaskLease {
    store: TaskStore,
    id: TaskId,
    source_path: PathBuf,
    finished: bool,
}

impl TaskLease {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn set_progress(&self, progress: u8) {
        self.store.set_progress(self.id, progress);
    }

    pub fn succeed(mut self, result_path: PathBuf) -> Completion {
        self.finished = true;
        self.store.complete(self.id, TaskOutcome::Success(result_path))
    }

    pub fn fail(mut self) -> Completion {
        self.finished = true;
        self.store.complete(self.id, TaskOutcome::Failure)
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(task_id = %self.id, "Task abandoned before completion, marking as failed");
        if let Completion::Recorded { expired } = self.store.complete(self.id, TaskOutcome::Failure) {
            for path in expired {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}
