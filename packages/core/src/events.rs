//! Event types for real-time status updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobResult, Status};

/// Events emitted by the worker, one per status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was enqueued.
    Enqueued { job: Job, timestamp: DateTime<Utc> },
    /// A job was assigned to an executor slot and started running.
    Started {
        job_id: JobId,
        attempt: u32,
        slot: usize,
        timestamp: DateTime<Utc>,
    },
    /// A running job reported progress.
    Progressed {
        job_id: JobId,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    Completed {
        job_id: JobId,
        result: JobResult,
        timestamp: DateTime<Utc>,
    },
    /// A job attempt failed.
    Failed {
        job_id: JobId,
        reason: String,
        attempts: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A failed job went back to pending, with another attempt scheduled.
    Retrying {
        job_id: JobId,
        attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job was cancelled.
    Cancelled { job_id: JobId, timestamp: DateTime<Utc> },
    /// A terminal record was evicted from the registry.
    Evicted { job_id: JobId, timestamp: DateTime<Utc> },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Enqueued { timestamp, .. } => *timestamp,
            JobEvent::Started { timestamp, .. } => *timestamp,
            JobEvent::Progressed { timestamp, .. } => *timestamp,
            JobEvent::Completed { timestamp, .. } => *timestamp,
            JobEvent::Failed { timestamp, .. } => *timestamp,
            JobEvent::Retrying { timestamp, .. } => *timestamp,
            JobEvent::Cancelled { timestamp, .. } => *timestamp,
            JobEvent::Evicted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID this event refers to.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Enqueued { job, .. } => job.id,
            JobEvent::Started { job_id, .. } => *job_id,
            JobEvent::Progressed { job_id, .. } => *job_id,
            JobEvent::Completed { job_id, .. } => *job_id,
            JobEvent::Failed { job_id, .. } => *job_id,
            JobEvent::Retrying { job_id, .. } => *job_id,
            JobEvent::Cancelled { job_id, .. } => *job_id,
            JobEvent::Evicted { job_id, .. } => *job_id,
        }
    }

    /// The status a subscriber observes after this transition, if any.
    ///
    /// Eviction carries no status of its own; the record was already
    /// terminal when it happened.
    pub fn as_status(&self) -> Option<Status> {
        match self {
            JobEvent::Enqueued { .. } => Some(Status::Pending),
            JobEvent::Started { .. } => Some(Status::Running { progress: 0 }),
            JobEvent::Progressed { progress, .. } => Some(Status::Running {
                progress: *progress,
            }),
            JobEvent::Completed { result, .. } => Some(Status::Complete {
                result: result.clone(),
            }),
            JobEvent::Failed {
                reason, will_retry, ..
            } => Some(Status::Failed {
                reason: reason.clone(),
                permanent: !will_retry,
            }),
            JobEvent::Retrying { .. } => Some(Status::Pending),
            JobEvent::Cancelled { .. } => Some(Status::Failed {
                reason: "cancelled".to_string(),
                permanent: true,
            }),
            JobEvent::Evicted { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::Enqueued { job, .. } => {
                format!("Job {} ({}) enqueued", job.id, job.kind)
            }
            JobEvent::Started {
                job_id,
                attempt,
                slot,
                ..
            } => format!("Job {} started on slot {} (attempt {})", job_id, slot, attempt),
            JobEvent::Progressed {
                job_id, progress, ..
            } => format!("Job {} at {}%", job_id, progress),
            JobEvent::Completed { job_id, result, .. } => {
                format!("Job {} completed: {}", job_id, result.summary)
            }
            JobEvent::Failed {
                job_id,
                reason,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, reason, retry)
            }
            JobEvent::Retrying {
                job_id,
                attempt,
                delay_ms,
                ..
            } => format!("Job {} retrying in {}ms (attempt {})", job_id, delay_ms, attempt),
            JobEvent::Cancelled { job_id, .. } => format!("Job {} cancelled", job_id),
            JobEvent::Evicted { job_id, .. } => format!("Job {} evicted", job_id),
        }
    }
}
