//! Actor system for the background job worker.
//!
//! This crate provides the ractor-based actor system that runs background
//! jobs: a dispatcher owning the queue and registry, a fixed pool of
//! executors, a periodic scheduler and a restarting supervisor.
//!
//! # Architecture
//!
//! - `Supervisor` - top-level actor; restarts the dispatcher and periodic
//!   tasks one-for-one on unexpected exits
//! - `DispatcherActor` - single authority over the job queue and registry
//! - `ExecutorActor` - runs one job body at a time, reports back
//! - `PeriodicActor` - self-rescheduling recurring task
//!
//! # Usage
//!
//! ```ignore
//! use actors::{FnHandler, JobHandlerRegistry, start};
//! use worker_core::WorkerConfig;
//!
//! let mut handlers = JobHandlerRegistry::new();
//! handlers.register(FnHandler::new("echo", |job, progress| { ... }));
//!
//! let (service, _handle) = start(WorkerConfig::default(), handlers).await?;
//! let id = service.enqueue("echo", serde_json::json!("hello")).await?;
//! let status = service.status(id).await?;
//! ```

mod clock;
mod dispatcher;
mod executor;
mod handler;
mod messages;
mod retry;
mod scheduler;
mod service;
mod supervisor;

pub use dispatcher::DispatcherActor;
pub use executor::ExecutorActor;
pub use handler::{
    FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry, ProgressReporter,
};
pub use messages::{DispatcherMessage, ExecutorMessage, SupervisorMessage, WorkerError};
pub use retry::RetryPolicy;
pub use scheduler::{
    PeriodicActor, PeriodicBody, PeriodicFuture, PeriodicMessage, PeriodicSpec, PeriodicStats,
};
pub use service::{JobService, StatusStream, start};
pub use supervisor::Supervisor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
