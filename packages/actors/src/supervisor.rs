//! Supervisor actor: owns the dispatcher and periodic tasks, restarts
//! them one-for-one on unexpected exits.

use std::collections::HashMap;
use std::sync::Arc;

use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;
use worker_core::{JobEvent, WorkerConfig};

use crate::dispatcher::{DispatcherActor, DispatcherArgs};
use crate::handler::JobHandlerRegistry;
use crate::messages::{DispatcherMessage, SupervisorMessage, WorkerError};
use crate::scheduler::{PeriodicActor, PeriodicMessage, PeriodicSpec};

/// State for the supervisor actor.
pub struct SupervisorState {
    config: WorkerConfig,
    handlers: Arc<JobHandlerRegistry>,
    /// Event broadcaster, shared with every dispatcher incarnation.
    event_tx: broadcast::Sender<JobEvent>,
    /// The current dispatcher.
    dispatcher: ActorRef<DispatcherMessage>,
    /// Periodic task actors and their registrations, by name.
    periodic: HashMap<String, (PeriodicSpec, ActorRef<PeriodicMessage>)>,
    /// Children restarted after unexpected exits.
    restarts: u64,
    shutting_down: bool,
}

async fn spawn_dispatcher(
    myself: &ActorRef<SupervisorMessage>,
    config: &WorkerConfig,
    handlers: &Arc<JobHandlerRegistry>,
    event_tx: &broadcast::Sender<JobEvent>,
) -> Result<ActorRef<DispatcherMessage>, ActorProcessingErr> {
    let (dispatcher, _handle) = Actor::spawn_linked(
        None,
        DispatcherActor,
        DispatcherArgs {
            config: config.clone(),
            handlers: handlers.clone(),
            event_tx: event_tx.clone(),
        },
        myself.get_cell(),
    )
    .await
    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn dispatcher: {e}")))?;
    Ok(dispatcher)
}

async fn spawn_periodic(
    myself: &ActorRef<SupervisorMessage>,
    spec: PeriodicSpec,
) -> Result<ActorRef<PeriodicMessage>, ActorProcessingErr> {
    let (actor, _handle) = Actor::spawn_linked(None, PeriodicActor, spec, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn periodic task: {e}")))?;
    Ok(actor)
}

/// Forward a message to a child, dropping it (and its reply port) if the
/// child is down; the caller then sees the reply channel close.
fn forward<M: ractor::Message>(actor: &ActorRef<M>, msg: M) {
    if actor.send_message(msg).is_err() {
        tracing::warn!("Child actor unavailable; dropping forwarded request");
    }
}

/// Supervisor actor for the whole worker.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = (WorkerConfig, JobHandlerRegistry);

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        (config, handlers): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job worker supervisor");
        let (event_tx, _) = broadcast::channel(1024);
        let handlers = Arc::new(handlers);
        let dispatcher = spawn_dispatcher(&myself, &config, &handlers, &event_tx).await?;

        Ok(SupervisorState {
            config,
            handlers,
            event_tx,
            dispatcher,
            periodic: HashMap::new(),
            restarts: 0,
            shutting_down: false,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            // Caller operations are forwarded to the current dispatcher,
            // reply ports and all; this keeps service handles valid across
            // dispatcher restarts. A send into a dispatcher that died this
            // instant drops the reply port, which the caller observes as
            // `Unavailable` rather than the supervisor going down too.
            SupervisorMessage::Enqueue {
                kind,
                payload,
                options,
                reply,
            } => {
                forward(
                    &state.dispatcher,
                    DispatcherMessage::Enqueue {
                        kind,
                        payload,
                        options,
                        reply,
                    },
                );
            }

            SupervisorMessage::GetStatus { job_id, reply } => {
                forward(
                    &state.dispatcher,
                    DispatcherMessage::GetStatus { job_id, reply },
                );
            }

            SupervisorMessage::Cancel { job_id, reply } => {
                forward(
                    &state.dispatcher,
                    DispatcherMessage::Cancel { job_id, reply },
                );
            }

            SupervisorMessage::ListAll { reply } => {
                forward(&state.dispatcher, DispatcherMessage::ListAll { reply });
            }

            SupervisorMessage::SubscribeEvents { reply } => {
                let _ = reply.send(state.event_tx.subscribe());
            }

            SupervisorMessage::RegisterPeriodic { spec, reply } => {
                if state.periodic.contains_key(&spec.name) {
                    let _ = reply.send(Err(WorkerError::PeriodicExists(spec.name.clone())));
                    return Ok(());
                }
                match spawn_periodic(&myself, spec.clone()).await {
                    Ok(actor) => {
                        state.periodic.insert(spec.name.clone(), (spec, actor));
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(WorkerError::Unavailable(e.to_string())));
                    }
                }
            }

            SupervisorMessage::RunPeriodicNow { name, reply } => {
                match state.periodic.get(&name) {
                    Some((_, actor)) => {
                        forward(actor, PeriodicMessage::RunNow { reply });
                    }
                    None => {
                        let _ = reply.send(Err(WorkerError::PeriodicNotFound(name)));
                    }
                }
            }

            SupervisorMessage::PeriodicStats { name, reply } => {
                match state.periodic.get(&name) {
                    Some((_, actor)) => {
                        forward(actor, PeriodicMessage::Stats { reply });
                    }
                    None => {
                        let _ = reply.send(Err(WorkerError::PeriodicNotFound(name)));
                    }
                }
            }

            SupervisorMessage::RestartCount { reply } => {
                let _ = reply.send(state.restarts);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down job worker");
                state.shutting_down = true;
                let _ = state.dispatcher.send_message(DispatcherMessage::Shutdown);
                for (spec_name, (_, actor)) in &state.periodic {
                    tracing::debug!("Stopping periodic task '{}'", spec_name);
                    let _ = actor.send_message(PeriodicMessage::Shutdown);
                }
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let cell = match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                tracing::warn!("Child actor failed: {}", err);
                cell
            }
            SupervisionEvent::ActorTerminated(cell, _, _) => cell,
            _ => return Ok(()),
        };

        if state.shutting_down {
            return Ok(());
        }

        if cell.get_id() == state.dispatcher.get_id() {
            // In-memory semantics: the new dispatcher starts with an empty
            // registry; jobs that were in flight read as NotFound.
            tracing::warn!("Dispatcher exited unexpectedly; restarting with an empty registry");
            state.restarts += 1;
            state.dispatcher =
                spawn_dispatcher(&myself, &state.config, &state.handlers, &state.event_tx).await?;
            return Ok(());
        }

        let name = state
            .periodic
            .iter()
            .find(|(_, (_, actor))| actor.get_id() == cell.get_id())
            .map(|(name, _)| name.clone());
        if let Some(name) = name {
            tracing::warn!("Periodic task '{}' exited unexpectedly; restarting", name);
            state.restarts += 1;
            let spec = state.periodic[&name].0.clone();
            let actor = spawn_periodic(&myself, spec.clone()).await?;
            state.periodic.insert(name, (spec, actor));
        }

        Ok(())
    }
}
