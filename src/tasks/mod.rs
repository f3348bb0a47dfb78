//! Asynchronous calendar enrichment tasks.

pub mod store;
pub mod worker;

pub use store::{
    Completion, EvictedTask, Submission, TaskId, TaskLease, TaskOutcome, TaskState, TaskStats,
    TaskStatus, TaskStore,
};
pub use worker::{
    OUTPUT_SUFFIX, ProcessError, UPLOAD_SUFFIX, Worker, WorkerSettings, sweep_work_dir,
};
