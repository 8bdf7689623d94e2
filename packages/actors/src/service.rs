//! Service facade over the actor system.
//!
//! This is the surface a request layer consumes: it translates calls into
//! supervisor messages and awaits the replies. All operations go through
//! the supervisor, so a handle stays valid across dispatcher restarts.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use ractor::{Actor, ActorRef, RpcReplyPort, SpawnErr};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use worker_core::{JobEvent, JobId, JobOptions, Status, TrackedJobSummary, WorkerConfig};

use crate::handler::JobHandlerRegistry;
use crate::messages::{SupervisorMessage, WorkerError};
use crate::scheduler::{PeriodicBody, PeriodicSpec, PeriodicStats};
use crate::supervisor::Supervisor;

/// Start the worker and return a service handle plus the supervisor's
/// join handle.
pub async fn start(
    config: WorkerConfig,
    handlers: JobHandlerRegistry,
) -> Result<(JobService, JoinHandle<()>), SpawnErr> {
    let (supervisor, handle) = Actor::spawn(None, Supervisor, (config, handlers)).await?;
    Ok((JobService { supervisor }, handle))
}

/// Handle to a running job worker. Cheap to clone.
#[derive(Clone)]
pub struct JobService {
    supervisor: ActorRef<SupervisorMessage>,
}

impl JobService {
    async fn call<T, F>(&self, make: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> SupervisorMessage,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.supervisor
            .send_message(make(tx.into()))
            .map_err(|e| WorkerError::Unavailable(e.to_string()))?;
        rx.await
            .map_err(|_| WorkerError::Unavailable("no reply from supervisor".to_string()))
    }

    /// Enqueue a job with worker-wide defaults.
    pub async fn enqueue(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<JobId, WorkerError> {
        self.enqueue_with(kind, payload, JobOptions::default()).await
    }

    /// Enqueue a job with per-job overrides.
    pub async fn enqueue_with(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, WorkerError> {
        let kind = kind.into();
        self.call(move |reply| SupervisorMessage::Enqueue {
            kind,
            payload,
            options,
            reply,
        })
        .await?
    }

    /// Read a job's current status. Unknown and evicted IDs read as
    /// [`Status::NotFound`].
    pub async fn status(&self, job_id: JobId) -> Result<Status, WorkerError> {
        self.call(move |reply| SupervisorMessage::GetStatus { job_id, reply })
            .await
    }

    /// Cancel a job. Returns false if the job is already terminal or
    /// unknown. Running jobs are cancelled optimistically: the executor is
    /// not interrupted, its eventual report is ignored.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool, WorkerError> {
        self.call(move |reply| SupervisorMessage::Cancel { job_id, reply })
            .await
    }

    /// List all tracked jobs, oldest first.
    pub async fn list(&self) -> Result<Vec<TrackedJobSummary>, WorkerError> {
        self.call(|reply| SupervisorMessage::ListAll { reply }).await
    }

    /// Subscribe to the raw event firehose.
    pub async fn subscribe_events(&self) -> Result<broadcast::Receiver<JobEvent>, WorkerError> {
        self.call(|reply| SupervisorMessage::SubscribeEvents { reply })
            .await
    }

    /// Per-job status stream: one item per transition from subscription
    /// time onward, ending after a terminal status.
    pub async fn subscribe(&self, job_id: JobId) -> Result<StatusStream, WorkerError> {
        let mut events = self.subscribe_events().await?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if event.job_id() != job_id {
                    continue;
                }
                let Some(status) = event.as_status() else {
                    continue;
                };
                let terminal = status.is_terminal();
                if tx.send(status).is_err() || terminal {
                    break;
                }
            }
        });

        Ok(StatusStream { rx })
    }

    /// Register a named periodic task. The body reschedules itself after
    /// each run completes, so runs never overlap.
    pub async fn register_periodic(
        &self,
        name: impl Into<String>,
        interval: Duration,
        body: impl PeriodicBody,
    ) -> Result<(), WorkerError> {
        let spec = PeriodicSpec {
            name: name.into(),
            interval,
            body: Arc::new(body),
        };
        self.call(move |reply| SupervisorMessage::RegisterPeriodic { spec, reply })
            .await?
    }

    /// Trigger an out-of-band run of a periodic task, without disturbing
    /// its next scheduled tick. Resolves when the run completes.
    pub async fn run_periodic_now(&self, name: impl Into<String>) -> Result<(), WorkerError> {
        let name = name.into();
        self.call(move |reply| SupervisorMessage::RunPeriodicNow { name, reply })
            .await?
    }

    /// Read a periodic task's run statistics.
    pub async fn periodic_stats(
        &self,
        name: impl Into<String>,
    ) -> Result<PeriodicStats, WorkerError> {
        let name = name.into();
        self.call(move |reply| SupervisorMessage::PeriodicStats { name, reply })
            .await?
    }

    /// How many children the supervisor has restarted after unexpected
    /// exits.
    pub async fn restart_count(&self) -> Result<u64, WorkerError> {
        self.call(|reply| SupervisorMessage::RestartCount { reply })
            .await
    }

    /// Shut the whole worker down.
    pub fn shutdown(&self) {
        let _ = self.supervisor.send_message(SupervisorMessage::Shutdown);
    }
}

/// Stream of status transitions for one job, closed after a terminal item.
pub struct StatusStream {
    rx: mpsc::UnboundedReceiver<Status>,
}

impl StatusStream {
    /// Receive the next transition, or `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<Status> {
        self.rx.recv().await
    }
}

impl Stream for StatusStream {
    type Item = Status;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
