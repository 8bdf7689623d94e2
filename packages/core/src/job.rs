//! Job domain types for units of background work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological ordering.
///
/// Minted by the dispatcher at enqueue time; callers never supply their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable unit of requested work.
///
/// The payload is opaque to the engine; only the handler registered for
/// `kind` interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Tag used to look up the handler that runs this job.
    pub kind: String,
    /// Kind-specific input data.
    pub payload: serde_json::Value,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job with a freshly minted ID.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            kind: kind.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Per-job overrides applied at enqueue time.
///
/// Fields left unset fall back to the worker-wide defaults in
/// [`crate::WorkerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Retry ceiling for this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Wall-clock timeout for a single attempt, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// Caller-visible state of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    /// Job is waiting for a free executor slot.
    #[default]
    Pending,
    /// Job is currently being executed.
    Running {
        /// Last reported progress, 0..=100.
        progress: u8,
    },
    /// Job completed successfully.
    Complete { result: JobResult },
    /// Job failed. `permanent` is false while a retry is still scheduled.
    Failed { reason: String, permanent: bool },
    /// The job ID is unknown, or the record has been evicted.
    NotFound,
}

impl Status {
    /// Check whether no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Complete { .. } | Status::Failed { permanent: true, .. }
        )
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running { .. } => "running",
            Status::Complete { .. } => "complete",
            Status::Failed { .. } => "failed",
            Status::NotFound => "not_found",
        }
    }
}

/// Registry record wrapping a job with its execution metadata.
///
/// Mutated only by the dispatcher; executors report outcomes, they never
/// touch the record themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedJob {
    /// The immutable job this record tracks.
    pub job: Job,
    /// Current status.
    pub status: Status,
    /// Number of execution attempts so far.
    pub attempts: u32,
    /// Retry ceiling, fixed at creation. Always at least 1.
    pub max_attempts: u32,
    /// Wall-clock timeout for a single attempt, in seconds.
    pub timeout_secs: u64,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl TrackedJob {
    /// Create a new pending record for a freshly enqueued job.
    pub fn new(job: Job, max_attempts: u32, timeout_secs: u64) -> Self {
        let created_at = job.created_at;
        Self {
            job,
            status: Status::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            timeout_secs,
            updated_at: created_at,
        }
    }

    /// Check whether the record has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Flat row for dashboard listings.
    pub fn summary(&self) -> TrackedJobSummary {
        TrackedJobSummary {
            id: self.job.id,
            kind: self.job.kind.clone(),
            status: self.status.clone(),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            created_at: self.job.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Flat view of a [`TrackedJob`] for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedJobSummary {
    pub id: JobId,
    pub kind: String,
    pub status: Status,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
