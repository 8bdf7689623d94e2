//! Message types for actor communication.

use ractor::RpcReplyPort;
use tokio::sync::broadcast;
use worker_core::{Job, JobEvent, JobId, JobOptions, JobResult, Status, TrackedJobSummary};

use crate::scheduler::{PeriodicSpec, PeriodicStats};

/// Messages for the dispatcher actor.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// Enqueue a new job; the dispatcher mints the ID.
    Enqueue {
        kind: String,
        payload: serde_json::Value,
        options: JobOptions,
        reply: RpcReplyPort<Result<JobId, WorkerError>>,
    },

    /// Read a job's current status.
    GetStatus {
        job_id: JobId,
        reply: RpcReplyPort<Status>,
    },

    /// Cancel a pending or running job.
    Cancel {
        job_id: JobId,
        reply: RpcReplyPort<bool>,
    },

    /// List all tracked jobs.
    ListAll {
        reply: RpcReplyPort<Vec<TrackedJobSummary>>,
    },

    /// Progress report from the executor on `slot`.
    Progress {
        job_id: JobId,
        slot: usize,
        progress: u8,
    },

    /// Success report from the executor on `slot`.
    Succeeded {
        job_id: JobId,
        slot: usize,
        result: JobResult,
    },

    /// Failure report from the executor on `slot`.
    Failed {
        job_id: JobId,
        slot: usize,
        reason: String,
    },

    /// A retry backoff elapsed; the job may rejoin the queue.
    RetryDue { job_id: JobId },

    /// Periodic retention sweep.
    Tick,

    /// Shutdown the dispatcher and its executors.
    Shutdown,
}

/// Messages for an executor actor.
#[derive(Debug)]
pub enum ExecutorMessage {
    /// Run a job to completion and report the outcome back.
    Run { job: Box<Job>, timeout_secs: u64 },
}

/// Messages for the supervisor.
///
/// Caller-facing operations are forwarded to the current dispatcher with
/// the reply port moved through, so handles stay valid across restarts.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Enqueue a new job.
    Enqueue {
        kind: String,
        payload: serde_json::Value,
        options: JobOptions,
        reply: RpcReplyPort<Result<JobId, WorkerError>>,
    },

    /// Read a job's current status.
    GetStatus {
        job_id: JobId,
        reply: RpcReplyPort<Status>,
    },

    /// Cancel a job.
    Cancel {
        job_id: JobId,
        reply: RpcReplyPort<bool>,
    },

    /// List all tracked jobs.
    ListAll {
        reply: RpcReplyPort<Vec<TrackedJobSummary>>,
    },

    /// Subscribe to the event firehose.
    SubscribeEvents {
        reply: RpcReplyPort<broadcast::Receiver<JobEvent>>,
    },

    /// Register and start a periodic task.
    RegisterPeriodic {
        spec: PeriodicSpec,
        reply: RpcReplyPort<Result<(), WorkerError>>,
    },

    /// Trigger an out-of-band run of a periodic task.
    RunPeriodicNow {
        name: String,
        reply: RpcReplyPort<Result<(), WorkerError>>,
    },

    /// Read a periodic task's run statistics.
    PeriodicStats {
        name: String,
        reply: RpcReplyPort<Result<PeriodicStats, WorkerError>>,
    },

    /// How many children have been restarted after unexpected exits.
    RestartCount { reply: RpcReplyPort<u64> },

    /// Shutdown the whole worker.
    Shutdown,
}

/// Errors surfaced to callers of the worker.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error("job registry is at capacity")]
    QueueFull,

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("periodic task not found: {0}")]
    PeriodicNotFound(String),

    #[error("periodic task already registered: {0}")]
    PeriodicExists(String),

    #[error("worker unavailable: {0}")]
    Unavailable(String),
}
