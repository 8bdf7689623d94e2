//! Periodic scheduler: self-rescheduling recurring tasks.
//!
//! Each registered task gets its own actor. The next tick is scheduled
//! only after the current run completes, so a slow body stretches the
//! effective period instead of overlapping runs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::{Deserialize, Serialize};

use crate::clock;
use crate::messages::WorkerError;

/// Future type for periodic task bodies.
pub type PeriodicFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// Body of a periodic task.
///
/// Blanket-implemented for async closures, so
/// `|| async { Ok(()) }` registers directly.
pub trait PeriodicBody: Send + Sync + 'static {
    fn run(&self) -> PeriodicFuture;
}

impl<F, Fut> PeriodicBody for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn run(&self) -> PeriodicFuture {
        Box::pin((self)())
    }
}

/// Registration for a periodic task. The supervisor keeps it so the task
/// can be respawned after a crash.
#[derive(Clone)]
pub struct PeriodicSpec {
    pub name: String,
    pub interval: Duration,
    pub body: Arc<dyn PeriodicBody>,
}

impl fmt::Debug for PeriodicSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicSpec")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Introspection snapshot for a periodic task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodicStats {
    /// Completed runs, failed ones included.
    pub total_runs: u64,
    /// When the most recent run finished.
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Messages for a periodic task actor.
#[derive(Debug)]
pub enum PeriodicMessage {
    /// Scheduled tick: run the body, then schedule the next tick.
    Fire,

    /// Out-of-band run that leaves the scheduled tick alone.
    RunNow {
        reply: RpcReplyPort<Result<(), WorkerError>>,
    },

    /// Read run statistics.
    Stats {
        reply: RpcReplyPort<Result<PeriodicStats, WorkerError>>,
    },

    /// Stop ticking.
    Shutdown,
}

/// State for a periodic task actor.
pub struct PeriodicActorState {
    spec: PeriodicSpec,
    stats: PeriodicStats,
}

/// Actor driving one periodic task.
pub struct PeriodicActor;

impl Actor for PeriodicActor {
    type Msg = PeriodicMessage;
    type State = PeriodicActorState;
    type Arguments = PeriodicSpec;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        spec: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting periodic task '{}' every {:?}",
            spec.name,
            spec.interval
        );
        clock::schedule_once(spec.interval, myself, PeriodicMessage::Fire);
        Ok(PeriodicActorState {
            spec,
            stats: PeriodicStats::default(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PeriodicMessage::Fire => {
                run_body(state).await;
                clock::schedule_once(state.spec.interval, myself, PeriodicMessage::Fire);
            }

            PeriodicMessage::RunNow { reply } => {
                run_body(state).await;
                let _ = reply.send(Ok(()));
            }

            PeriodicMessage::Stats { reply } => {
                let _ = reply.send(Ok(state.stats.clone()));
            }

            PeriodicMessage::Shutdown => {
                tracing::info!("Stopping periodic task '{}'", state.spec.name);
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Run the body once, panic-contained, recording the outcome. A failed run
/// must never stop the task from ticking.
async fn run_body(state: &mut PeriodicActorState) {
    let outcome = match tokio::spawn(state.spec.body.run()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(reason),
        Err(join_err) => Err(format!("periodic body panicked: {join_err}")),
    };

    state.stats.total_runs += 1;
    state.stats.last_run_at = Some(Utc::now());

    if let Err(reason) = outcome {
        tracing::warn!("Periodic task '{}' failed: {}", state.spec.name, reason);
    }
}
