//! Job handler trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ractor::ActorRef;
use worker_core::{Job, JobId, JobResult};

use crate::messages::DispatcherMessage;

/// Result type for job handlers.
pub type HandlerResult = Result<JobResult, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Reports execution progress back to the dispatcher.
///
/// Handed to a handler by the executor that owns its job. Reports for a job
/// that is no longer running under that executor are discarded by the
/// dispatcher, so a handler may keep reporting after cancellation without
/// corrupting anything.
#[derive(Clone)]
pub struct ProgressReporter {
    dispatcher: ActorRef<DispatcherMessage>,
    job_id: JobId,
    slot: usize,
}

impl ProgressReporter {
    pub(crate) fn new(dispatcher: ActorRef<DispatcherMessage>, job_id: JobId, slot: usize) -> Self {
        Self {
            dispatcher,
            job_id,
            slot,
        }
    }

    /// Report progress as a percentage, clamped to 100.
    pub fn report(&self, progress: u8) {
        let _ = self.dispatcher.send_message(DispatcherMessage::Progress {
            job_id: self.job_id,
            slot: self.slot,
            progress: progress.min(100),
        });
    }
}

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of a specific kind are run.
pub trait JobHandler: Send + Sync + 'static {
    /// The job kind this handler runs.
    fn kind(&self) -> &str;

    /// Run a job and return the result, reporting progress along the way.
    fn handle(&self, job: &Job, progress: ProgressReporter) -> HandlerFuture;
}

/// Registry for job handlers.
///
/// Maps job kinds to their handlers; populated at startup and shared with
/// the executor pool.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its job kind.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let kind = handler.kind().to_string();
        self.handlers.insert(kind, Arc::new(handler));
    }

    /// Get the handler for a job kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Check if a handler exists for a job kind.
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// List all registered job kinds.
    pub fn kinds(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(&Job, ProgressReporter) -> HandlerFuture + Send + Sync + 'static,
{
    kind: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job, ProgressReporter) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(kind: impl Into<String>, handler: F) -> Self {
        Self {
            kind: kind.into(),
            handler,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job, ProgressReporter) -> HandlerFuture + Send + Sync + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    fn handle(&self, job: &Job, progress: ProgressReporter) -> HandlerFuture {
        (self.handler)(job, progress)
    }
}
