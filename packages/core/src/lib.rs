//! Core domain types for the background job worker.
//!
//! This crate contains the shared types used by the actor system and its
//! callers:
//! - Job, TrackedJob and Status for units of work and their lifecycle
//! - JobEvent for real-time status updates
//! - WorkerConfig for engine configuration

mod config;
mod events;
mod job;

pub use config::WorkerConfig;
pub use events::JobEvent;
pub use job::{Job, JobId, JobOptions, JobResult, Status, TrackedJob, TrackedJobSummary};
