//! Supervisor, readiness and stop tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use stackop::app::options::{ReadinessOptions, SupervisorOptions};
use stackop::app::run::run;
use stackop::deploy::readiness::wait_for_runtime;
use stackop::deploy::stop::stop_stack;
use stackop::errors::{ErrorKind, OpsError};

/// Sleep that returns at once and records the requested durations
fn recording_sleep() -> (
    Arc<Mutex<Vec<Duration>>>,
    impl Fn(Duration) -> std::future::Ready<()>,
) {
    let slept = Arc::new(Mutex::new(Vec::new()));
    let log = slept.clone();
    let sleep_fn = move |d: Duration| {
        log.lock().unwrap().push(d);
        std::future::ready(())
    };
    (slept, sleep_fn)
}

/// Real tokio sleep that also records the requested durations
fn recording_tokio_sleep() -> (
    Arc<Mutex<Vec<Duration>>>,
    impl Fn(Duration) -> tokio::time::Sleep,
) {
    let slept = Arc::new(Mutex::new(Vec::new()));
    let log = slept.clone();
    let sleep_fn = move |d: Duration| {
        log.lock().unwrap().push(d);
        tokio::time::sleep(d)
    };
    (slept, sleep_fn)
}

#[tokio::test(start_paused = true)]
async fn test_readiness_times_out_after_budget() {
    let engine = FakeEngine::default();
    let (slept, sleep_fn) = recording_tokio_sleep();
    let started = Instant::now();

    let err = wait_for_runtime(&engine, &ReadinessOptions::default(), sleep_fn)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(started.elapsed(), Duration::from_secs(300));
    let slept = slept.lock().unwrap();
    assert_eq!(slept.iter().sum::<Duration>(), Duration::from_secs(300));
    assert!(slept.iter().all(|d| *d == Duration::from_secs(5)));
    // One probe before each sleep, plus the final one at the deadline
    assert_eq!(engine.probes.load(Ordering::SeqCst), 61);
}

#[tokio::test(start_paused = true)]
async fn test_slow_probes_count_against_budget() {
    let engine = FakeEngine {
        probe_delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let started = Instant::now();

    let err = wait_for_runtime(&engine, &ReadinessOptions::default(), tokio::time::sleep)
        .await
        .unwrap_err();

    assert!(matches!(err, OpsError::Timeout(_)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(300), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(301), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_that_answers_in_time_is_ready() {
    let engine = FakeEngine {
        probe_delay: Some(Duration::from_secs(2)),
        ..FakeEngine::ready()
    };
    let started = Instant::now();

    wait_for_runtime(&engine, &ReadinessOptions::default(), tokio::time::sleep)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_readiness_succeeds_once_probe_passes() {
    let engine = FakeEngine {
        ready_after: Some(3),
        ..Default::default()
    };
    let (slept, sleep_fn) = recording_sleep();

    wait_for_runtime(&engine, &ReadinessOptions::default(), sleep_fn)
        .await
        .unwrap();

    assert_eq!(engine.probes.load(Ordering::SeqCst), 4);
    assert_eq!(slept.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_timeout_never_launches() {
    let (_dir, layout) = workspace(Some(OLD_DESCRIPTOR));
    let engine = FakeEngine::default();
    let (_, sleep_fn) = recording_tokio_sleep();

    let err = run(
        &engine,
        &layout,
        &SupervisorOptions::default(),
        CancellationToken::new(),
        sleep_fn,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, OpsError::Timeout(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(engine.ups.load(Ordering::SeqCst), 0);
    assert_eq!(engine.downs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_supervisor_requires_descriptor() {
    let (_dir, layout) = workspace(None);
    let engine = FakeEngine::ready();

    let err = run(
        &engine,
        &layout,
        &SupervisorOptions::default(),
        CancellationToken::new(),
        |_| async {},
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FatalPrecondition);
    assert_eq!(engine.probes.load(Ordering::SeqCst), 0);
    assert_eq!(engine.ups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_supervisor_launch_failure_is_fatal() {
    let (_dir, layout) = workspace(Some(OLD_DESCRIPTOR));
    let engine = FakeEngine {
        fail_up: true,
        ..FakeEngine::ready()
    };

    let err = run(
        &engine,
        &layout,
        &SupervisorOptions::default(),
        CancellationToken::new(),
        |_| async {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, OpsError::CommandError(_)));
    assert_eq!(engine.downs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_supervisor_health_checks_until_shutdown() {
    let (_dir, layout) = workspace(Some(OLD_DESCRIPTOR));
    let shutdown = CancellationToken::new();
    let engine = FakeEngine {
        running: Vec::new(),
        cancel_after_checks: Some((2, shutdown.clone())),
        ..FakeEngine::ready()
    };
    let (slept, sleep_fn) = recording_sleep();

    run(
        &engine,
        &layout,
        &SupervisorOptions::default(),
        shutdown,
        sleep_fn,
    )
    .await
    .unwrap();

    assert_eq!(engine.ups.load(Ordering::SeqCst), 1);
    assert!(engine.health_checks.load(Ordering::SeqCst) >= 2);
    assert!(slept
        .lock()
        .unwrap()
        .iter()
        .all(|d| *d == Duration::from_secs(30)));
    assert_eq!(engine.downs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_is_handled_even_if_stop_fails() {
    let (_dir, layout) = workspace(Some(OLD_DESCRIPTOR));
    let shutdown = CancellationToken::new();
    let engine = FakeEngine {
        fail_down: true,
        cancel_after_checks: Some((1, shutdown.clone())),
        ..FakeEngine::ready()
    };

    let result = run(
        &engine,
        &layout,
        &SupervisorOptions::default(),
        shutdown,
        |_| async {},
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(engine.downs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_while_waiting_for_runtime() {
    let (_dir, layout) = workspace(Some(OLD_DESCRIPTOR));
    let engine = FakeEngine::default();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    run(
        &engine,
        &layout,
        &SupervisorOptions::default(),
        shutdown,
        |_| std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(engine.ups.load(Ordering::SeqCst), 0);
    assert_eq!(engine.downs.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_cancels_token() {
    use stackop::app::run::cancel_on_signal;

    let token = CancellationToken::new();
    let handle = cancel_on_signal(token.clone()).unwrap();

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .expect("token cancelled by SIGTERM");
    handle.await.unwrap();
}

#[tokio::test]
async fn test_stop_requires_descriptor() {
    let (_dir, layout) = workspace(None);
    let engine = FakeEngine::ready();

    let err = stop_stack(&engine, &layout).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FatalPrecondition);
    assert_eq!(engine.downs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_passes_engine_result_through() {
    let (_dir, layout) = workspace(Some(OLD_DESCRIPTOR));

    assert!(stop_stack(&FakeEngine::ready(), &layout).await.is_ok());

    let failing = FakeEngine {
        fail_down: true,
        ..FakeEngine::ready()
    };
    let err = stop_stack(&failing, &layout).await.unwrap_err();
    assert!(matches!(err, OpsError::CommandError(_)));
    assert_eq!(failing.downs.load(Ordering::SeqCst), 1);
}
