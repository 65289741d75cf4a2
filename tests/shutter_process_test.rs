//! End-to-end tests driving real shell commands.
#![cfg(unix)]

use apogee_fpi::config::Settings;
use apogee_fpi::mock::RecordingNotifier;
use apogee_fpi::notify::MessageCode;
use apogee_fpi::runner::ProcessRunner;
use apogee_fpi::{OperationOutcome, ShutterCoordinator, ShutterPosition};
use std::sync::Arc;

fn settings(open: &str, close: &str, calbox_program: &str) -> Settings {
    let mut settings = Settings::default();
    settings.shutter.open_command = open.to_string();
    settings.shutter.close_command = close.to_string();
    settings.calbox.program = calbox_program.to_string();
    settings
}

const OPEN_SCRIPT: &str = r#"printf 'Apogeefpi says "message:shutters:high1:ok"\n'"#;
const CLOSE_SCRIPT: &str = r#"printf 'Apogeefpi says "message:shutters:low1:ok"\n'"#;

#[tokio::test]
async fn test_open_and_close_with_real_processes() {
    let settings = settings(OPEN_SCRIPT, CLOSE_SCRIPT, "true");
    let mut coordinator =
        ShutterCoordinator::from_settings(&settings, Arc::new(ProcessRunner::new())).unwrap();
    let notifier = RecordingNotifier::new();

    assert_eq!(
        coordinator.open(&notifier).await,
        OperationOutcome::Finished(ShutterPosition::Open)
    );
    assert_eq!(
        coordinator.close(false, &notifier).await,
        OperationOutcome::Finished(ShutterPosition::Closed)
    );
    assert!(!notifier
        .replies()
        .iter()
        .any(|reply| reply.code == MessageCode::Warning));
}

#[tokio::test]
async fn test_failing_command_reports_exit_code_and_stderr() {
    let settings = settings(OPEN_SCRIPT, "echo 'limit switch fault' >&2; exit 2", "true");
    let mut coordinator =
        ShutterCoordinator::from_settings(&settings, Arc::new(ProcessRunner::new())).unwrap();
    let notifier = RecordingNotifier::new();

    coordinator.open(&notifier).await;
    let outcome = coordinator.close(true, &notifier).await;

    assert_eq!(outcome, OperationOutcome::Failed);
    assert_eq!(coordinator.position(), ShutterPosition::Unknown);
    let error = notifier
        .replies()
        .into_iter()
        .find(|reply| reply.code == MessageCode::Error)
        .unwrap();
    assert_eq!(
        error.text_value(),
        Some("Close shutter failed with error code 2: limit switch fault")
    );
}

#[tokio::test]
async fn test_failing_calbox_relay_only_warns() {
    let settings = settings(OPEN_SCRIPT, CLOSE_SCRIPT, "false");
    let mut coordinator =
        ShutterCoordinator::from_settings(&settings, Arc::new(ProcessRunner::new())).unwrap();
    let notifier = RecordingNotifier::new();

    let outcome = coordinator.open(&notifier).await;

    assert_eq!(outcome, OperationOutcome::Finished(ShutterPosition::Open));
    let warning = notifier
        .replies()
        .into_iter()
        .find(|reply| reply.code == MessageCode::Warning)
        .unwrap();
    assert!(warning
        .text_value()
        .unwrap()
        .starts_with("Calibration box shutter open failed with error code 1"));
}
