//! Lifecycle tests driving the coordinator against real scripted children.
//!
//! Each test spawns `/bin/sh` with a small script standing in for the
//! external tool, then polls the event queue the way the CLI does:
//! state transitions, output streaming, cancellation, single-run
//! enforcement, and ephemeral config cleanup.

#![cfg(unix)]

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use s2t::coordinator::{Coordinator, Event, LaunchSpec, RunOutcome, RunStatus};
use s2t::test_support::test_config;

const WAIT_LIMIT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

fn shell(script: &str) -> LaunchSpec {
    LaunchSpec {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    }
}

/// Poll until `Finished` arrives, collecting output lines along the way.
fn wait_for_finish(coordinator: &Coordinator) -> (Vec<String>, RunOutcome) {
    let deadline = Instant::now() + WAIT_LIMIT;
    let mut lines = Vec::new();
    loop {
        for event in coordinator.poll() {
            match event {
                Event::Line(line) => lines.push(line),
                Event::Finished(outcome) => return (lines, outcome),
            }
        }
        assert!(Instant::now() < deadline, "run did not finish in time");
        thread::sleep(POLL_INTERVAL);
    }
}

/// Poll until a line containing `needle` shows up, keeping what was read.
fn wait_for_line(coordinator: &Coordinator, needle: &str) -> Vec<String> {
    let deadline = Instant::now() + WAIT_LIMIT;
    let mut lines = Vec::new();
    loop {
        for event in coordinator.poll() {
            match event {
                Event::Line(line) => lines.push(line),
                Event::Finished(outcome) => panic!("finished early: {outcome:?}"),
            }
        }
        if lines.iter().any(|line| line.contains(needle)) {
            return lines;
        }
        assert!(
            Instant::now() < deadline,
            "never saw `{needle}` in {lines:?}"
        );
        thread::sleep(POLL_INTERVAL);
    }
}

#[test]
fn successful_run_streams_lines_and_cleans_up() {
    let coordinator = Coordinator::new();
    let config = test_config();
    let config_dir: PathBuf = config.path().to_path_buf();

    coordinator
        .start(shell("echo one; echo two >&2; echo three"), config)
        .expect("start");

    let (lines, outcome) = wait_for_finish(&coordinator);
    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(coordinator.status(), RunStatus::Succeeded);

    // stdout and stderr are merged into the one queue.
    assert!(lines.contains(&"one".to_string()), "lines: {lines:?}");
    assert!(lines.contains(&"two".to_string()), "lines: {lines:?}");
    assert!(lines.contains(&"three".to_string()), "lines: {lines:?}");

    assert!(
        !config_dir.exists(),
        "ephemeral config dir must be deleted after success"
    );
}

#[test]
fn failing_run_reports_literal_exit_code() {
    let coordinator = Coordinator::new();
    let config = test_config();
    let config_dir = config.path().to_path_buf();

    coordinator
        .start(shell("echo boom; exit 2"), config)
        .expect("start");

    let (lines, outcome) = wait_for_finish(&coordinator);
    match &outcome {
        RunOutcome::Failed { code, message } => {
            assert_eq!(*code, Some(2));
            assert!(message.contains('2'), "message: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(coordinator.status(), RunStatus::Failed { code: Some(2) });
    assert!(lines.contains(&"boom".to_string()));
    assert!(
        !config_dir.exists(),
        "ephemeral config dir must be deleted after failure"
    );
}

#[test]
fn cancel_before_exit_always_yields_cancelled() {
    let coordinator = Coordinator::new();
    let config = test_config();
    let config_dir = config.path().to_path_buf();

    coordinator
        .start(shell("echo started; sleep 30"), config)
        .expect("start");
    wait_for_line(&coordinator, "started");
    assert_eq!(coordinator.status(), RunStatus::Running);

    coordinator.cancel();

    // Cancellation is requested, not awaited; the terminal state arrives
    // asynchronously and must be Cancelled whatever the child's exit code.
    let (_, outcome) = wait_for_finish(&coordinator);
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(coordinator.status(), RunStatus::Cancelled);
    assert!(
        !config_dir.exists(),
        "ephemeral config dir must be deleted after cancellation"
    );
}

#[test]
fn second_start_while_running_is_rejected() {
    let coordinator = Coordinator::new();

    coordinator
        .start(shell("echo started; sleep 30"), test_config())
        .expect("start");
    wait_for_line(&coordinator, "started");

    let second_config = test_config();
    let second_dir = second_config.path().to_path_buf();
    let err = coordinator
        .start(shell("echo never"), second_config)
        .expect_err("second start must be rejected");
    assert!(err.to_string().contains("already in progress"));

    // The rejected run's config is dropped immediately, not leaked.
    assert!(!second_dir.exists());

    coordinator.cancel();
    let (lines, outcome) = wait_for_finish(&coordinator);
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(
        !lines.contains(&"never".to_string()),
        "rejected run must not have spawned"
    );
}

#[test]
fn spawn_failure_is_terminal_failed_with_guidance() {
    let coordinator = Coordinator::new();
    let config = test_config();
    let config_dir = config.path().to_path_buf();

    let spec = LaunchSpec::for_module("/nonexistent/python-s2t-test", "spotify_to_tidal", vec![
        "sync".to_string(),
    ]);
    coordinator.start(spec, config).expect("start");

    let (lines, outcome) = wait_for_finish(&coordinator);
    match &outcome {
        RunOutcome::Failed { code, message } => {
            assert_eq!(*code, None);
            assert!(message.contains("could not start"), "message: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(coordinator.status(), RunStatus::Failed { code: None });
    assert!(
        lines.iter().any(|line| line.contains("could not start")),
        "diagnostic line expected, got {lines:?}"
    );
    assert!(
        !config_dir.exists(),
        "ephemeral config dir must be deleted after spawn failure"
    );
}

#[test]
fn coordinator_is_reusable_after_terminal_state() {
    let coordinator = Coordinator::new();

    coordinator
        .start(shell("echo first"), test_config())
        .expect("start");
    let (_, outcome) = wait_for_finish(&coordinator);
    assert_eq!(outcome, RunOutcome::Succeeded);

    // Terminal state counts as ready for a new invocation.
    coordinator
        .start(shell("echo second"), test_config())
        .expect("second start");
    let (lines, outcome) = wait_for_finish(&coordinator);
    assert_eq!(outcome, RunOutcome::Succeeded);
    assert!(lines.contains(&"second".to_string()));
}
