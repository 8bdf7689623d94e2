use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use actors::{
    FnHandler, JobHandlerRegistry, JobService, ProgressReporter, WorkerError, start,
};
use serde_json::json;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep};
use worker_core::{Job, JobId, JobOptions, JobResult, Status, WorkerConfig};

fn test_config(executors: usize) -> WorkerConfig {
    WorkerConfig {
        executors,
        retry_base_delay_ms: 40,
        default_timeout_secs: 5,
        ..WorkerConfig::default()
    }
}

/// Handler that sleeps for the number of milliseconds in the payload.
fn sleepy_handler()
-> FnHandler<impl Fn(&Job, ProgressReporter) -> actors::HandlerFuture + Send + Sync + 'static> {
    FnHandler::new("sleepy", |job: &Job, _progress: ProgressReporter| {
        let millis = job.payload.as_u64().unwrap_or(10);
        Box::pin(async move {
            sleep(Duration::from_millis(millis)).await;
            Ok(JobResult::new("slept"))
        })
    })
}

async fn wait_for_status<F>(
    service: &JobService,
    job_id: JobId,
    timeout: Duration,
    pred: F,
) -> Status
where
    F: Fn(&Status) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let status = service.status(job_id).await.expect("status request failed");
        if pred(&status) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting, last status: {status:?}"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn echo_job_runs_to_completion() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new(
        "echo",
        |job: &Job, progress: ProgressReporter| {
            let payload = job.payload.clone();
            Box::pin(async move {
                progress.report(50);
                progress.report(100);
                Ok(JobResult::new(
                    payload.as_str().unwrap_or_default().to_string(),
                ))
            })
        },
    ));
    let (service, _handle) = start(test_config(2), handlers).await?;

    let job_id = service.enqueue("echo", json!("hello")).await?;
    let status =
        wait_for_status(&service, job_id, Duration::from_secs(2), Status::is_terminal).await;
    match status {
        Status::Complete { result } => assert_eq!(result.summary, "hello"),
        other => panic!("expected completion, got {other:?}"),
    }

    let jobs = service.list().await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].attempts, 1);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn flaky_job_succeeds_after_backoff_retries() -> Result<(), Box<dyn Error>> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new(
        "flaky",
        move |_job: &Job, _progress: ProgressReporter| {
            let counter = counter.clone();
            Box::pin(async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok(JobResult::new("made it"))
                }
            })
        },
    ));
    let (service, _handle) = start(test_config(1), handlers).await?;

    let started = Instant::now();
    let job_id = service
        .enqueue_with(
            "flaky",
            json!({}),
            JobOptions {
                max_attempts: Some(3),
                ..Default::default()
            },
        )
        .await?;
    let status =
        wait_for_status(&service, job_id, Duration::from_secs(3), Status::is_terminal).await;
    assert!(matches!(status, Status::Complete { .. }));

    // Two backoff waits at base 40ms: 40ms then 80ms.
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let jobs = service.list().await?;
    assert_eq!(jobs[0].attempts, 3);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn always_failing_job_ends_permanently_failed() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new(
        "boom",
        |_job: &Job, _progress: ProgressReporter| {
            Box::pin(async move { Err("boom".to_string()) })
        },
    ));
    let (service, _handle) = start(test_config(1), handlers).await?;

    let job_id = service
        .enqueue_with(
            "boom",
            json!(null),
            JobOptions {
                max_attempts: Some(2),
                ..Default::default()
            },
        )
        .await?;
    let status =
        wait_for_status(&service, job_id, Duration::from_secs(3), Status::is_terminal).await;
    match status {
        Status::Failed { reason, permanent } => {
            assert_eq!(reason, "boom");
            assert!(permanent);
        }
        other => panic!("expected permanent failure, got {other:?}"),
    }

    let jobs = service.list().await?;
    assert_eq!(jobs[0].attempts, 2);
    assert_eq!(jobs[0].max_attempts, 2);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn saturated_pool_keeps_fifo_order() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(sleepy_handler());
    let (service, _handle) = start(test_config(1), handlers).await?;

    let slow = service.enqueue("sleepy", json!(200)).await?;
    let fast = service.enqueue("sleepy", json!(10)).await?;

    sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        service.status(slow).await?,
        Status::Running { .. }
    ));
    assert_eq!(service.status(fast).await?, Status::Pending);

    let status =
        wait_for_status(&service, fast, Duration::from_secs(2), Status::is_terminal).await;
    assert!(matches!(status, Status::Complete { .. }));
    // The slow job held the only slot, so it finished first.
    assert!(service.status(slow).await?.is_terminal());

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn cancelling_a_pending_job_skips_it() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(sleepy_handler());
    let (service, _handle) = start(test_config(1), handlers).await?;

    let slow = service.enqueue("sleepy", json!(300)).await?;
    let victim = service.enqueue("sleepy", json!(10)).await?;

    assert!(service.cancel(victim).await?);
    match service.status(victim).await? {
        Status::Failed { reason, permanent } => {
            assert_eq!(reason, "cancelled");
            assert!(permanent);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }

    // Cancelling a terminal job is a no-op.
    assert!(!service.cancel(victim).await?);

    wait_for_status(&service, slow, Duration::from_secs(2), Status::is_terminal).await;
    sleep(Duration::from_millis(50)).await;

    // The cancelled job was skipped when the queue was next scanned.
    let jobs = service.list().await?;
    let victim_row = jobs.iter().find(|j| j.id == victim).expect("victim listed");
    assert_eq!(victim_row.attempts, 0);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_job_ignores_the_late_report() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(sleepy_handler());
    let (service, _handle) = start(test_config(1), handlers).await?;

    let job_id = service.enqueue("sleepy", json!(200)).await?;
    wait_for_status(&service, job_id, Duration::from_secs(1), |status| {
        matches!(status, Status::Running { .. })
    })
    .await;

    assert!(service.cancel(job_id).await?);
    assert!(matches!(
        service.status(job_id).await?,
        Status::Failed { permanent: true, .. }
    ));

    // Let the handler finish and report; the report must be ignored.
    sleep(Duration::from_millis(300)).await;
    match service.status(job_id).await? {
        Status::Failed { reason, permanent } => {
            assert_eq!(reason, "cancelled");
            assert!(permanent);
        }
        other => panic!("cancellation was overwritten: {other:?}"),
    }

    // The slot was freed by the ignored report, so new work still runs.
    let next = service.enqueue("sleepy", json!(10)).await?;
    let status =
        wait_for_status(&service, next, Duration::from_secs(2), Status::is_terminal).await;
    assert!(matches!(status, Status::Complete { .. }));

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn panicking_handler_is_contained() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new(
        "panicky",
        |_job: &Job, _progress: ProgressReporter| {
            Box::pin(async move {
                panic!("kaboom");
            })
        },
    ));
    handlers.register(sleepy_handler());
    let (service, _handle) = start(test_config(1), handlers).await?;

    let job_id = service
        .enqueue_with(
            "panicky",
            json!(null),
            JobOptions {
                max_attempts: Some(1),
                ..Default::default()
            },
        )
        .await?;
    let status =
        wait_for_status(&service, job_id, Duration::from_secs(2), Status::is_terminal).await;
    match status {
        Status::Failed { reason, permanent } => {
            assert!(reason.contains("panicked"), "unexpected reason: {reason}");
            assert!(permanent);
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // The dispatcher survived and keeps serving jobs.
    let next = service.enqueue("sleepy", json!(10)).await?;
    let status =
        wait_for_status(&service, next, Duration::from_secs(2), Status::is_terminal).await;
    assert!(matches!(status, Status::Complete { .. }));
    assert_eq!(service.restart_count().await?, 0);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn executor_pool_limits_concurrency() -> Result<(), Box<dyn Error>> {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (c, p) = (current.clone(), peak.clone());

    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new(
        "counting",
        move |_job: &Job, _progress: ProgressReporter| {
            let (c, p) = (c.clone(), p.clone());
            Box::pin(async move {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(100)).await;
                c.fetch_sub(1, Ordering::SeqCst);
                Ok(JobResult::new("counted"))
            })
        },
    ));
    let (service, _handle) = start(test_config(2), handlers).await?;

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(service.enqueue("counting", json!(null)).await?);
    }
    for job_id in ids {
        let status =
            wait_for_status(&service, job_id, Duration::from_secs(3), Status::is_terminal).await;
        assert!(matches!(status, Status::Complete { .. }));
    }

    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "more than two jobs ran concurrently"
    );

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn enqueue_fails_when_registry_is_full() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(sleepy_handler());
    let config = WorkerConfig {
        max_jobs: Some(1),
        ..test_config(1)
    };
    let (service, _handle) = start(config, handlers).await?;

    service.enqueue("sleepy", json!(300)).await?;
    let err = service
        .enqueue("sleepy", json!(10))
        .await
        .expect_err("second enqueue must be rejected");
    assert!(matches!(err, WorkerError::QueueFull));

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn status_of_unknown_job_is_not_found() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(test_config(1), JobHandlerRegistry::new()).await?;

    assert_eq!(service.status(JobId::new()).await?, Status::NotFound);
    assert!(!service.cancel(JobId::new()).await?);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn job_without_a_handler_fails() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(test_config(1), JobHandlerRegistry::new()).await?;

    let job_id = service
        .enqueue_with(
            "unregistered",
            json!(null),
            JobOptions {
                max_attempts: Some(1),
                ..Default::default()
            },
        )
        .await?;
    let status =
        wait_for_status(&service, job_id, Duration::from_secs(2), Status::is_terminal).await;
    match status {
        Status::Failed { reason, permanent } => {
            assert!(reason.contains("no handler"), "unexpected reason: {reason}");
            assert!(permanent);
        }
        other => panic!("expected failure, got {other:?}"),
    }

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn subscription_streams_transitions_until_terminal() -> Result<(), Box<dyn Error>> {
    let gate = Arc::new(Notify::new());
    let released = gate.clone();

    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new(
        "gated",
        move |_job: &Job, progress: ProgressReporter| {
            let gate = released.clone();
            Box::pin(async move {
                gate.notified().await;
                progress.report(50);
                Ok(JobResult::new("done"))
            })
        },
    ));
    let (service, _handle) = start(test_config(1), handlers).await?;

    let job_id = service.enqueue("gated", json!(null)).await?;
    wait_for_status(&service, job_id, Duration::from_secs(1), |status| {
        matches!(status, Status::Running { .. })
    })
    .await;

    let mut stream = service.subscribe(job_id).await?;
    gate.notify_one();

    assert_eq!(stream.recv().await, Some(Status::Running { progress: 50 }));
    match stream.recv().await {
        Some(Status::Complete { result }) => assert_eq!(result.summary, "done"),
        other => panic!("expected completion, got {other:?}"),
    }
    // The stream closes after the terminal transition.
    assert_eq!(stream.recv().await, None);

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn terminal_jobs_are_evicted_after_retention() -> Result<(), Box<dyn Error>> {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(sleepy_handler());
    let config = WorkerConfig {
        retention_secs: 0,
        sweep_interval_secs: 1,
        ..test_config(1)
    };
    let (service, _handle) = start(config, handlers).await?;

    let job_id = service.enqueue("sleepy", json!(10)).await?;
    let status =
        wait_for_status(&service, job_id, Duration::from_secs(2), Status::is_terminal).await;
    assert!(matches!(status, Status::Complete { .. }));

    // The next sweep evicts the terminal record.
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(service.status(job_id).await?, Status::NotFound);
    assert!(service.list().await?.is_empty());

    service.shutdown();
    Ok(())
}
