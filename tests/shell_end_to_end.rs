// tests/shell_end_to_end.rs
//
// These spawn real processes through `sh`.
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;

use procvisor::exec::ShellLauncher;
use procvisor::{Delivery, StopOutcome, Stream, Supervisor, SupervisorOptions, WorkerStatus};

fn shell_supervisor() -> Supervisor {
    Supervisor::new(
        Arc::new(ShellLauncher::new("sh", 64)),
        SupervisorOptions::default(),
    )
}

#[tokio::test]
async fn echo_completes_with_recorded_history() {
    init_tracing();
    let supervisor = shell_supervisor();

    let id = supervisor.start("echo hi").expect("start");
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");
    assert_eq!(status, WorkerStatus::Completed);

    let snapshot = supervisor.query(&id).expect("query");
    assert!(snapshot.history_length >= 1);
    assert!(snapshot.pid > 0);
    assert_eq!(snapshot.exit_code, Some(0));

    let (history, mut listener) = supervisor.listen(&id).expect("listen");
    assert_eq!(history[0].text, "hi");
    assert_eq!(history[0].stream, Stream::Stdout);
    assert_eq!(listener.try_recv(), Some(Delivery::Completed));
}

#[tokio::test]
async fn stop_kills_a_sleeping_process() {
    init_tracing();
    let supervisor = shell_supervisor();

    let id = supervisor.start("sleep 100").expect("start");
    common::wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    assert!(matches!(
        supervisor.stop(&id).expect("stop"),
        StopOutcome::Requested { .. }
    ));
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");
    assert_eq!(status, WorkerStatus::Killed);
}

#[tokio::test]
async fn non_zero_exit_is_failed_with_code() {
    let supervisor = shell_supervisor();

    let id = supervisor.start("echo oops >&2; exit 3").expect("start");
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");
    assert_eq!(status, WorkerStatus::Failed);

    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.exit_code, Some(3));

    let history = supervisor.listen(&id).expect("listen").0;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].stream, Stream::Stderr);
    assert_eq!(history[0].text, "oops");
}

#[tokio::test]
async fn live_listener_sees_lines_in_order() {
    init_tracing();
    let supervisor = shell_supervisor();

    let id = supervisor
        .start("for i in 1 2 3 4 5; do echo line $i; sleep 0.05; done")
        .expect("start");
    let (history, mut listener) = supervisor.listen(&id).expect("listen");

    let (live, terminal) = with_timeout(listener.drain()).await;
    assert_eq!(terminal, Delivery::Completed);

    let texts: Vec<String> = history
        .iter()
        .chain(live.iter())
        .map(|e| e.text.clone())
        .collect();
    let expected: Vec<String> = (1..=5).map(|i| format!("line {i}")).collect();
    assert_eq!(texts, expected);
    assert_eq!(
        with_timeout(supervisor.wait(&id)).await.expect("wait"),
        WorkerStatus::Completed
    );
}

#[tokio::test]
async fn missing_shell_is_a_launch_failure() {
    let supervisor = Supervisor::new(
        Arc::new(ShellLauncher::new("/definitely/not/a/shell", 8)),
        SupervisorOptions::default(),
    );

    let id = supervisor.start("echo never").expect("start");
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");
    assert_eq!(status, WorkerStatus::Failed);

    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.pid, 0);
    assert!(snapshot.failure.is_some());
}

#[tokio::test]
async fn stop_kills_a_process_that_closed_its_output() {
    init_tracing();
    let supervisor = shell_supervisor();

    let id = supervisor
        .start("echo detaching; exec >/dev/null 2>&1; sleep 30")
        .expect("start");
    common::wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    // Both pipes are closed now but the shell is still alive.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(
        supervisor.query(&id).expect("query").status,
        WorkerStatus::Running
    );

    assert!(matches!(
        supervisor.stop(&id).expect("stop"),
        StopOutcome::Requested { .. }
    ));
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");
    assert_eq!(status, WorkerStatus::Killed);

    let history = supervisor.listen(&id).expect("listen").0;
    assert_eq!(history[0].text, "detaching");
}
