//! Executor actor: runs one job body at a time and reports back.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use worker_core::{Job, JobResult};

use crate::handler::{JobHandlerRegistry, ProgressReporter};
use crate::messages::{DispatcherMessage, ExecutorMessage};

/// Arguments for spawning an executor into a slot.
pub struct ExecutorArgs {
    pub slot: usize,
    pub dispatcher: ActorRef<DispatcherMessage>,
    pub handlers: Arc<JobHandlerRegistry>,
}

/// State for an executor actor.
pub struct ExecutorState {
    slot: usize,
    dispatcher: ActorRef<DispatcherMessage>,
    handlers: Arc<JobHandlerRegistry>,
}

/// Executor actor bound to one dispatcher slot.
///
/// Passive: the dispatcher pushes assignments; the executor never pulls.
/// Failures in the job body are contained here and reported back, they do
/// not propagate into the dispatcher.
pub struct ExecutorActor;

impl Actor for ExecutorActor {
    type Msg = ExecutorMessage;
    type State = ExecutorState;
    type Arguments = ExecutorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting executor for slot {}", args.slot);
        Ok(ExecutorState {
            slot: args.slot,
            dispatcher: args.dispatcher,
            handlers: args.handlers,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ExecutorMessage::Run { job, timeout_secs } => {
                let job = *job;
                let job_id = job.id;
                let slot = state.slot;

                let report = match run_job(state, job, timeout_secs).await {
                    Ok(result) => DispatcherMessage::Succeeded {
                        job_id,
                        slot,
                        result,
                    },
                    Err(reason) => DispatcherMessage::Failed {
                        job_id,
                        slot,
                        reason,
                    },
                };

                if state.dispatcher.send_message(report).is_err() {
                    tracing::warn!("Dispatcher is gone; dropping report for job {}", job_id);
                }
            }
        }

        Ok(())
    }
}

/// Run the handler for one job, with panic containment and a wall-clock cap.
async fn run_job(state: &ExecutorState, job: Job, timeout_secs: u64) -> Result<JobResult, String> {
    let Some(handler) = state.handlers.get(&job.kind) else {
        return Err(format!("no handler for job kind: {}", job.kind));
    };

    let progress = ProgressReporter::new(state.dispatcher.clone(), job.id, state.slot);

    // The body runs on its own task so a panic is contained there instead
    // of taking the executor down with it.
    let mut task = tokio::spawn(handler.handle(&job, progress));

    match tokio::time::timeout(Duration::from_secs(timeout_secs), &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) if join_err.is_panic() => Err(format!("job body panicked: {join_err}")),
        Ok(Err(_)) => Err("job task was aborted".to_string()),
        Err(_) => {
            task.abort();
            Err(format!("timed out after {timeout_secs}s"))
        }
    }
}
