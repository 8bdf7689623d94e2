use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{JobHandlerRegistry, WorkerError, start};
use tokio::time::sleep;
use worker_core::WorkerConfig;

#[tokio::test]
async fn slow_periodic_body_never_overlaps() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(WorkerConfig::default(), JobHandlerRegistry::new()).await?;

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    service
        .register_periodic("slow-sweep", Duration::from_millis(100), move || {
            let counter = counter.clone();
            async move {
                sleep(Duration::from_millis(250)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        })
        .await?;

    // With a 100ms interval and a 250ms body, each cycle takes ~350ms:
    // the next tick is scheduled only after the current run completes.
    sleep(Duration::from_millis(950)).await;
    let total = runs.load(Ordering::SeqCst);
    assert!(
        (2..=3).contains(&total),
        "expected 2-3 non-overlapping runs, got {total}"
    );

    let stats = service.periodic_stats("slow-sweep").await?;
    assert!(stats.total_runs >= 2);
    assert!(stats.last_run_at.is_some());

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn run_now_is_out_of_band() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(WorkerConfig::default(), JobHandlerRegistry::new()).await?;

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    service
        .register_periodic("rare", Duration::from_secs(600), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        })
        .await?;

    service.run_periodic_now("rare").await?;
    service.run_periodic_now("rare").await?;

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    let stats = service.periodic_stats("rare").await?;
    assert_eq!(stats.total_runs, 2);
    assert!(stats.last_run_at.is_some());

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn failing_body_keeps_ticking() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(WorkerConfig::default(), JobHandlerRegistry::new()).await?;

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    service
        .register_periodic("broken", Duration::from_millis(50), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("disk on fire".to_string())
            }
        })
        .await?;

    sleep(Duration::from_millis(400)).await;
    assert!(
        runs.load(Ordering::SeqCst) >= 3,
        "a failing body must not stop the schedule"
    );

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_is_rejected() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(WorkerConfig::default(), JobHandlerRegistry::new()).await?;

    let body = || async move { Ok::<(), String>(()) };
    service
        .register_periodic("nightly", Duration::from_secs(60), body)
        .await?;
    let err = service
        .register_periodic("nightly", Duration::from_secs(60), body)
        .await
        .expect_err("same name must be rejected");
    assert!(matches!(err, WorkerError::PeriodicExists(name) if name == "nightly"));

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn unknown_periodic_task_is_reported() -> Result<(), Box<dyn Error>> {
    let (service, _handle) = start(WorkerConfig::default(), JobHandlerRegistry::new()).await?;

    let err = service
        .periodic_stats("missing")
        .await
        .expect_err("stats for an unknown task must fail");
    assert!(matches!(err, WorkerError::PeriodicNotFound(_)));

    let err = service
        .run_periodic_now("missing")
        .await
        .expect_err("running an unknown task must fail");
    assert!(matches!(err, WorkerError::PeriodicNotFound(_)));

    service.shutdown();
    Ok(())
}
