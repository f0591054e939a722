//! Integration tests for `ProcessSupervisor` start/stop semantics.

use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

use git_webhook_listener::models::command::CommandSpec;
use git_webhook_listener::orchestrator::supervisor::ProcessSupervisor;
use git_webhook_listener::AppError;

use super::test_helpers::{Fixture, GRACE};

#[tokio::test]
async fn stop_without_start_is_no_process() {
    let fixture = Fixture::setup();
    let supervisor = fixture.supervisor(GRACE);

    let err = supervisor.stop().await.expect_err("nothing to stop");

    assert!(matches!(err, AppError::NoProcess(_)));
}

#[tokio::test]
async fn start_then_stop_tracks_exactly_one_process() {
    let fixture = Fixture::setup();
    let supervisor = fixture.supervisor(GRACE);
    assert!(!supervisor.is_running().await);

    let info = supervisor.start(&fixture.repo).await.expect("start");
    assert!(supervisor.is_running().await);
    assert_eq!(supervisor.current().await, Some(info.clone()));
    assert_eq!(info.working_dir, fixture.repo);
    fixture.wait_for_trace(1).await;

    let status = supervisor.stop().await.expect("stop");

    assert!(status.success(), "trap exits 0, got {status:?}");
    assert!(!supervisor.is_running().await);
    assert!(supervisor.current().await.is_none());
    assert_eq!(fixture.trace(), ["start", "stop"]);
}

#[tokio::test]
async fn second_start_is_already_running() {
    let fixture = Fixture::setup();
    let supervisor = fixture.supervisor(GRACE);
    let first = supervisor.start(&fixture.repo).await.expect("start");

    let err = supervisor
        .start(&fixture.repo)
        .await
        .expect_err("second start refused");

    assert!(matches!(err, AppError::AlreadyRunning(_)));
    assert_eq!(supervisor.current().await.map(|i| i.pid), Some(first.pid));
    supervisor.stop().await.expect("stop");
}

#[tokio::test]
async fn missing_binary_is_launch_error() {
    let fixture = Fixture::setup();
    let supervisor = ProcessSupervisor::new(
        CommandSpec::new("definitely-not-a-site-server", Vec::<String>::new()),
        GRACE,
    );

    let err = supervisor
        .start(&fixture.repo)
        .await
        .expect_err("spawn fails");

    assert!(matches!(err, AppError::Launch(_)));
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn missing_working_dir_is_launch_error() {
    let fixture = Fixture::setup();
    let supervisor = fixture.supervisor(GRACE);

    let err = supervisor
        .start(&fixture.repo.join("no-such-dir"))
        .await
        .expect_err("spawn fails");

    assert!(matches!(err, AppError::Launch(_)));
}

#[tokio::test]
async fn server_ignoring_sigterm_is_killed_after_grace() {
    let fixture = Fixture::setup();
    let supervisor = ProcessSupervisor::new(
        CommandSpec::shell("trap '' TERM; echo start >> trace; while :; do sleep 0.05; done"),
        Duration::from_millis(300),
    );
    supervisor.start(&fixture.repo).await.expect("start");
    fixture.wait_for_trace(1).await;

    let started = Instant::now();
    let status = supervisor.stop().await.expect("forced stop");

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(status.signal(), Some(9), "expected SIGKILL, got {status:?}");
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn server_that_already_exited_stops_cleanly() {
    let fixture = Fixture::setup();
    let supervisor = ProcessSupervisor::new(CommandSpec::shell("exit 0"), GRACE);
    supervisor.start(&fixture.repo).await.expect("start");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = supervisor.stop().await.expect("stop exited process");

    assert!(status.success());
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn restart_after_stop_gets_new_pid() {
    let fixture = Fixture::setup();
    let supervisor = fixture.supervisor(GRACE);
    let first = supervisor.start(&fixture.repo).await.expect("start");
    fixture.wait_for_trace(1).await;
    supervisor.stop().await.expect("stop");

    let second = supervisor.start(&fixture.repo).await.expect("restart");

    assert_ne!(first.pid, second.pid);
    fixture.wait_for_trace(3).await;
    supervisor.stop().await.expect("stop");
}
