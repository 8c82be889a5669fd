//! Daemon supervision with real `sh` children

#![cfg(unix)]

use std::time::Duration;

use k5realm::{DaemonLaunch, DaemonRole, DaemonSupervisor, Environment, Readiness, RealmError};

fn sh(script: &str, readiness: Readiness) -> DaemonLaunch {
    DaemonLaunch::new(["/bin/sh", "-c", script], readiness)
}

fn supervisor() -> DaemonSupervisor {
    DaemonSupervisor::new()
        .with_readiness_timeout(Duration::from_secs(10))
        .with_stop_grace(Duration::from_secs(2))
}

#[tokio::test]
async fn test_output_marker_then_terminate() {
    // Arrange
    let launch = sh("echo booting; echo 'kdc: starting...'; exec sleep 300", Readiness::output("starting..."));

    // Act
    let mut handle = supervisor()
        .start(DaemonRole::Kdc, &launch, &Environment::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(handle.role(), DaemonRole::Kdc);
    assert!(handle.pid().is_some());
    assert_eq!(supervisor().stop(&mut handle).await.unwrap(), -15);
}

#[tokio::test]
async fn test_exit_before_marker_reports_code() {
    // Arrange
    let launch = sh("echo booting; exit 3", Readiness::output("starting..."));

    // Act
    let result = supervisor()
        .start(DaemonRole::Kdc, &launch, &Environment::new())
        .await;

    // Assert
    match result {
        Err(RealmError::DaemonStartFailed { command, code }) => {
            assert_eq!(code, Some(3));
            assert!(command.contains("exit 3"));
        }
        other => panic!("expected DaemonStartFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_marker_times_out() {
    // Arrange
    let launch = sh("echo hello; exec sleep 300", Readiness::output("never printed"));
    let supervisor = supervisor().with_readiness_timeout(Duration::from_millis(300));

    // Act
    let result = supervisor
        .start(DaemonRole::Kadmind, &launch, &Environment::new())
        .await;

    // Assert
    assert!(matches!(
        result,
        Err(RealmError::ReadinessTimeout { timeout, .. }) if timeout == Duration::from_millis(300)
    ));
}

#[tokio::test]
async fn test_ignored_term_escalates_to_kill() {
    // Arrange
    let launch = sh("trap '' TERM; echo ready; exec sleep 300", Readiness::output("ready"));
    let supervisor = supervisor().with_stop_grace(Duration::from_millis(300));
    let mut handle = supervisor
        .start(DaemonRole::Kdc, &launch, &Environment::new())
        .await
        .unwrap();

    // Act
    let code = supervisor.stop(&mut handle).await.unwrap();

    // Assert
    assert_eq!(code, -9);
}

#[tokio::test]
async fn test_no_readiness_is_ready_at_spawn() {
    // Arrange
    let launch = sh("exec sleep 300", Readiness::None);

    // Act
    let mut handle = supervisor()
        .start(DaemonRole::Kadmind, &launch, &Environment::new())
        .await
        .unwrap();

    // Assert
    assert!(handle.command().contains("sleep 300"));
    assert_eq!(supervisor().stop(&mut handle).await.unwrap(), -15);
}

#[tokio::test]
async fn test_log_marker_ignores_stale_contents() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("kdc.log");
    std::fs::write(&log, "KDC started\n").unwrap();
    let script = format!("sleep 0.2; echo 'KDC started' >> '{}'; exec sleep 300", log.display());
    let launch = sh(&script, Readiness::log(&log, "KDC started"));

    // Act
    let mut handle = supervisor()
        .start(DaemonRole::Kdc, &launch, &Environment::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "KDC started\n");
    supervisor().stop(&mut handle).await.unwrap();
}

#[tokio::test]
async fn test_stopped_handle_can_be_stopped_again() {
    // Arrange
    let launch = sh("echo ready; exec sleep 300", Readiness::output("ready"));
    let supervisor = supervisor();
    let mut handle = supervisor
        .start(DaemonRole::Kdc, &launch, &Environment::new())
        .await
        .unwrap();

    // Act
    let first = supervisor.stop(&mut handle).await.unwrap();
    let second = supervisor.stop(&mut handle).await.unwrap();

    // Assert
    assert_eq!(first, -15);
    assert_eq!(second, -15);
    assert!(handle.pid().is_none());
}

#[tokio::test]
async fn test_chatty_daemon_output_is_bounded() {
    // Arrange
    let script = "echo ready; i=0; while [ $i -lt 3000 ]; do echo line $i; i=$((i+1)); done; exec sleep 300";
    let launch = sh(script, Readiness::output("ready"));
    let supervisor = supervisor();
    let mut handle = supervisor
        .start(DaemonRole::Kdc, &launch, &Environment::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Act
    let code = supervisor.stop(&mut handle).await.unwrap();

    // Assert
    assert_eq!(code, -15);
    assert!(handle.pid().is_none());
}
