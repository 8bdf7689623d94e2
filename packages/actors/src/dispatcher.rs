//! Dispatcher actor: single authority over the job queue and registry.
//!
//! All mutations of tracked jobs happen here, in response to caller
//! operations and executor reports. Executors only ever report; the
//! mailbox serializes everything, so there are no locks to take.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;
use worker_core::{Job, JobEvent, JobId, Status, TrackedJob, TrackedJobSummary, WorkerConfig};

use crate::clock;
use crate::executor::{ExecutorActor, ExecutorArgs};
use crate::handler::JobHandlerRegistry;
use crate::messages::{DispatcherMessage, ExecutorMessage, WorkerError};
use crate::retry::RetryPolicy;

/// One slot of the executor pool: the actor that runs jobs for this slot
/// and the job it currently owns, if any.
struct ExecutorSlot {
    executor: ActorRef<ExecutorMessage>,
    current: Option<JobId>,
}

/// Arguments for spawning the dispatcher.
pub struct DispatcherArgs {
    pub config: WorkerConfig,
    pub handlers: Arc<JobHandlerRegistry>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// State for the dispatcher actor.
pub struct DispatcherState {
    config: WorkerConfig,
    /// All tracked jobs by ID.
    jobs: HashMap<JobId, TrackedJob>,
    /// Pending job IDs awaiting assignment, FIFO.
    queue: VecDeque<JobId>,
    /// Fixed executor pool, one entry per slot.
    slots: Vec<ExecutorSlot>,
    handlers: Arc<JobHandlerRegistry>,
    retry: RetryPolicy,
    event_tx: broadcast::Sender<JobEvent>,
    shutting_down: bool,
}

impl DispatcherState {
    fn broadcast(&self, event: JobEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Pop queue entries until one still points at a pending record.
    /// Cancelled and evicted entries are skipped here.
    fn next_pending(&mut self) -> Option<JobId> {
        while let Some(job_id) = self.queue.pop_front() {
            match self.jobs.get(&job_id) {
                Some(tracked) if matches!(tracked.status, Status::Pending) => return Some(job_id),
                _ => continue,
            }
        }
        None
    }

    /// Assign pending jobs to idle slots until one of the two runs out.
    fn try_assign_next(&mut self) {
        loop {
            let Some(slot) = self.slots.iter().position(|s| s.current.is_none()) else {
                return;
            };
            let Some(job_id) = self.next_pending() else {
                return;
            };

            let (job, timeout_secs, attempt) = {
                let Some(tracked) = self.jobs.get_mut(&job_id) else {
                    continue;
                };
                tracked.attempts += 1;
                tracked.status = Status::Running { progress: 0 };
                tracked.updated_at = Utc::now();
                (tracked.job.clone(), tracked.timeout_secs, tracked.attempts)
            };

            self.slots[slot].current = Some(job_id);
            if self.slots[slot]
                .executor
                .send_message(ExecutorMessage::Run {
                    job: Box::new(job),
                    timeout_secs,
                })
                .is_err()
            {
                // The executor is down; its supervision event will fail the
                // job and respawn a replacement. Stop handing out work here.
                tracing::warn!("Executor for slot {} is unavailable", slot);
                return;
            }

            self.broadcast(JobEvent::Started {
                job_id,
                attempt,
                slot,
                timestamp: Utc::now(),
            });
        }
    }

    /// Free a slot if it still owns the reporting job. Returns whether the
    /// report came from the slot's current assignment; stale reports from a
    /// previous assignment are rejected.
    fn release_slot(&mut self, slot: usize, job_id: JobId) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) if s.current == Some(job_id) => {
                s.current = None;
                true
            }
            _ => false,
        }
    }

    /// Apply a failure report: either schedule a retry or mark the record
    /// permanently failed. Reports against non-running records (cancelled
    /// in the meantime) are ignored.
    fn apply_failure(&mut self, myself: &ActorRef<DispatcherMessage>, job_id: JobId, reason: String) {
        let (attempts, max_attempts) = match self.jobs.get(&job_id) {
            Some(tracked) if matches!(tracked.status, Status::Running { .. }) => {
                (tracked.attempts, tracked.max_attempts)
            }
            _ => return,
        };

        if self.retry.should_retry(attempts, max_attempts) {
            let delay = self.retry.backoff(attempts);
            if let Some(tracked) = self.jobs.get_mut(&job_id) {
                tracked.status = Status::Pending;
                tracked.updated_at = Utc::now();
            }
            tracing::info!(
                "Job {} failed (attempt {}/{}), retrying in {:?}: {}",
                job_id,
                attempts,
                max_attempts,
                delay,
                reason
            );
            self.broadcast(JobEvent::Failed {
                job_id,
                reason,
                attempts,
                will_retry: true,
                timestamp: Utc::now(),
            });
            self.broadcast(JobEvent::Retrying {
                job_id,
                attempt: attempts + 1,
                delay_ms: delay.as_millis() as u64,
                timestamp: Utc::now(),
            });
            // The job rejoins the queue only when this message arrives.
            clock::schedule_once(delay, myself.clone(), DispatcherMessage::RetryDue { job_id });
        } else {
            if let Some(tracked) = self.jobs.get_mut(&job_id) {
                tracked.status = Status::Failed {
                    reason: reason.clone(),
                    permanent: true,
                };
                tracked.updated_at = Utc::now();
            }
            tracing::warn!(
                "Job {} permanently failed after {} attempts: {}",
                job_id,
                attempts,
                reason
            );
            self.broadcast(JobEvent::Failed {
                job_id,
                reason,
                attempts,
                will_retry: false,
                timestamp: Utc::now(),
            });
        }
    }

    /// Cancel a non-terminal job. Running jobs are cancelled optimistically:
    /// the record goes terminal now, the executor keeps its slot until its
    /// eventual report, which is then ignored.
    fn cancel(&mut self, job_id: JobId) -> bool {
        let cancellable = matches!(
            self.jobs.get(&job_id).map(|t| &t.status),
            Some(Status::Pending | Status::Running { .. })
        );
        if !cancellable {
            return false;
        }

        self.queue.retain(|id| *id != job_id);
        if let Some(tracked) = self.jobs.get_mut(&job_id) {
            tracked.status = Status::Failed {
                reason: "cancelled".to_string(),
                permanent: true,
            };
            tracked.updated_at = Utc::now();
        }
        self.broadcast(JobEvent::Cancelled {
            job_id,
            timestamp: Utc::now(),
        });
        true
    }

    /// Evict terminal records older than the retention window.
    fn evict_expired(&mut self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.retention_secs as i64);
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, tracked)| tracked.is_terminal() && tracked.updated_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for job_id in expired {
            self.jobs.remove(&job_id);
            tracing::debug!("Evicted terminal job {}", job_id);
            self.broadcast(JobEvent::Evicted {
                job_id,
                timestamp: Utc::now(),
            });
        }
    }
}

async fn spawn_executor(
    myself: &ActorRef<DispatcherMessage>,
    handlers: &Arc<JobHandlerRegistry>,
    slot: usize,
) -> Result<ActorRef<ExecutorMessage>, ActorProcessingErr> {
    let (executor, _handle) = Actor::spawn_linked(
        None,
        ExecutorActor,
        ExecutorArgs {
            slot,
            dispatcher: myself.clone(),
            handlers: handlers.clone(),
        },
        myself.get_cell(),
    )
    .await
    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn executor: {e}")))?;
    Ok(executor)
}

/// Dispatcher actor owning the queue, the registry and the executor pool.
pub struct DispatcherActor;

impl Actor for DispatcherActor {
    type Msg = DispatcherMessage;
    type State = DispatcherState;
    type Arguments = DispatcherArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting dispatcher with {} executor slots",
            args.config.executors
        );

        let mut slots = Vec::with_capacity(args.config.executors);
        for slot in 0..args.config.executors {
            let executor = spawn_executor(&myself, &args.handlers, slot).await?;
            slots.push(ExecutorSlot {
                executor,
                current: None,
            });
        }

        clock::schedule_once(args.config.sweep_interval(), myself, DispatcherMessage::Tick);

        let retry = RetryPolicy::new(args.config.retry_base_delay());
        Ok(DispatcherState {
            config: args.config,
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            slots,
            handlers: args.handlers,
            retry,
            event_tx: args.event_tx,
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
            DispatcherMessage::Enqueue {
                kind,
                payload,
                options,
                reply,
            } => {
                if let Some(cap) = state.config.max_jobs
                    && state.jobs.len() >= cap
                {
                    let _ = reply.send(Err(WorkerError::QueueFull));
                    return Ok(());
                }

                let job = Job::new(kind, payload);
                let job_id = job.id;
                let tracked = TrackedJob::new(
                    job.clone(),
                    options
                        .max_attempts
                        .unwrap_or(state.config.default_max_attempts),
                    options
                        .timeout_secs
                        .unwrap_or(state.config.default_timeout_secs),
                );
                state.jobs.insert(job_id, tracked);
                state.queue.push_back(job_id);

                state.broadcast(JobEvent::Enqueued {
                    job,
                    timestamp: Utc::now(),
                });
                let _ = reply.send(Ok(job_id));

                state.try_assign_next();
            }

            DispatcherMessage::GetStatus { job_id, reply } => {
                let status = state
                    .jobs
                    .get(&job_id)
                    .map(|tracked| tracked.status.clone())
                    .unwrap_or(Status::NotFound);
                let _ = reply.send(status);
            }

            DispatcherMessage::Cancel { job_id, reply } => {
                let _ = reply.send(state.cancel(job_id));
            }

            DispatcherMessage::ListAll { reply } => {
                let mut summaries: Vec<TrackedJobSummary> =
                    state.jobs.values().map(TrackedJob::summary).collect();
                summaries.sort_by_key(|summary| summary.id);
                let _ = reply.send(summaries);
            }

            DispatcherMessage::Progress {
                job_id,
                slot,
                progress,
            } => {
                let owns = matches!(
                    state.slots.get(slot),
                    Some(s) if s.current == Some(job_id)
                );
                let mut applied = None;
                if owns
                    && let Some(tracked) = state.jobs.get_mut(&job_id)
                    && matches!(tracked.status, Status::Running { .. })
                {
                    let progress = progress.min(100);
                    tracked.status = Status::Running { progress };
                    tracked.updated_at = Utc::now();
                    applied = Some(progress);
                }
                if let Some(progress) = applied {
                    state.broadcast(JobEvent::Progressed {
                        job_id,
                        progress,
                        timestamp: Utc::now(),
                    });
                }
            }

            DispatcherMessage::Succeeded {
                job_id,
                slot,
                result,
            } => {
                let owned = state.release_slot(slot, job_id);
                let mut completed = None;
                if owned
                    && let Some(tracked) = state.jobs.get_mut(&job_id)
                    && matches!(tracked.status, Status::Running { .. })
                {
                    tracked.status = Status::Complete {
                        result: result.clone(),
                    };
                    tracked.updated_at = Utc::now();
                    completed = Some(result);
                }
                if let Some(result) = completed {
                    state.broadcast(JobEvent::Completed {
                        job_id,
                        result,
                        timestamp: Utc::now(),
                    });
                }
                state.try_assign_next();
            }

            DispatcherMessage::Failed {
                job_id,
                slot,
                reason,
            } => {
                if state.release_slot(slot, job_id) {
                    state.apply_failure(&myself, job_id, reason);
                }
                state.try_assign_next();
            }

            DispatcherMessage::RetryDue { job_id } => {
                // Skip jobs cancelled or evicted during the backoff wait.
                let pending = matches!(
                    state.jobs.get(&job_id).map(|t| &t.status),
                    Some(Status::Pending)
                );
                if pending {
                    state.queue.push_back(job_id);
                    state.try_assign_next();
                }
            }

            DispatcherMessage::Tick => {
                state.evict_expired();
                clock::schedule_once(
                    state.config.sweep_interval(),
                    myself.clone(),
                    DispatcherMessage::Tick,
                );
            }

            DispatcherMessage::Shutdown => {
                tracing::info!("Shutting down dispatcher");
                state.shutting_down = true;
                for slot in &state.slots {
                    slot.executor.stop(None);
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
                tracing::warn!("Executor crashed: {}", err);
                cell
            }
            SupervisionEvent::ActorTerminated(cell, _, _) if !state.shutting_down => cell,
            _ => return Ok(()),
        };

        let Some(slot) = state
            .slots
            .iter()
            .position(|s| s.executor.get_id() == cell.get_id())
        else {
            return Ok(());
        };

        // Whatever the dead executor was running counts as a failed attempt.
        if let Some(job_id) = state.slots[slot].current.take() {
            state.apply_failure(&myself, job_id, "executor crashed".to_string());
        }

        let executor = spawn_executor(&myself, &state.handlers, slot).await?;
        state.slots[slot].executor = executor;
        state.try_assign_next();
        Ok(())
    }
}
