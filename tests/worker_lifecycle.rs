// tests/worker_lifecycle.rs

mod common;
use crate::common::{FakeLauncher, init_tracing, supervisor_with, wait_for_status, with_timeout};

use std::sync::Arc;

use std::time::Duration;

use tokio::runtime::Handle;

use procvisor::exec::ExitResult;
use procvisor::worker::Worker;
use procvisor::{Delivery, StopOutcome, WorkerStatus};

#[tokio::test]
async fn fresh_worker_is_pending_then_running() {
    init_tracing();

    let (launcher, mut controls) = FakeLauncher::manual(true);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("serve forever").expect("start");

    // The launch runs on a spawned task; nothing has polled it yet.
    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.status, WorkerStatus::Pending);
    assert_eq!(snapshot.pid, 0);
    assert_eq!(snapshot.history_length, 0);

    let control = with_timeout(controls.recv()).await.expect("process launched");
    wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.pid, control.pid);
    assert_eq!(snapshot.command, "serve forever");
    assert!(snapshot.exit_code.is_none());

    control.exit(ExitResult::success());
    assert_eq!(
        with_timeout(supervisor.wait(&id)).await.expect("wait"),
        WorkerStatus::Completed
    );
}

#[tokio::test]
async fn stop_on_pending_worker_is_a_no_op() {
    let (launcher, _controls) = FakeLauncher::manual(true);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("sleep 100").expect("start");
    assert_eq!(supervisor.stop(&id).expect("stop"), StopOutcome::NotRunningYet);

    // The request is not remembered; the worker still starts.
    wait_for_status(&supervisor, &id, WorkerStatus::Running).await;
}

#[tokio::test]
async fn scripted_output_is_recorded_in_order() {
    init_tracing();

    let launcher = FakeLauncher::scripted(&["first", "second", "third"], ExitResult::success());
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("print three").expect("start");
    with_timeout(supervisor.wait(&id)).await.expect("wait");

    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.status, WorkerStatus::Completed);
    assert_eq!(snapshot.history_length, 3);
    assert_eq!(snapshot.exit_code, Some(0));

    let (history, mut listener) = supervisor.listen(&id).expect("listen");
    let texts: Vec<&str> = history.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
    assert_eq!(listener.try_recv(), Some(Delivery::Completed));
}

#[tokio::test]
async fn non_zero_exit_marks_worker_failed() {
    let launcher = FakeLauncher::scripted(&["boom"], ExitResult::failure(3));
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("fail").expect("start");
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");

    assert_eq!(status, WorkerStatus::Failed);
    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.exit_code, Some(3));
    assert_eq!(snapshot.history_length, 1);
    assert!(snapshot.failure.is_none());
}

#[tokio::test]
async fn launch_failure_goes_straight_to_failed() {
    init_tracing();

    let launcher = Arc::new(FakeLauncher::failing("no such binary"));
    let supervisor = supervisor_with(launcher.clone());

    let id = supervisor.start("missing-binary --flag").expect("start still succeeds");
    let status = with_timeout(supervisor.wait(&id)).await.expect("wait");
    assert_eq!(status, WorkerStatus::Failed);

    let snapshot = supervisor.query(&id).expect("query");
    assert_eq!(snapshot.pid, 0);
    assert_eq!(snapshot.history_length, 0);
    assert!(
        snapshot
            .failure
            .as_deref()
            .is_some_and(|msg| msg.contains("no such binary"))
    );
    assert_eq!(launcher.launched(), vec!["missing-binary --flag".to_string()]);

    // History is still replayable and the listener completes immediately.
    let (history, mut listener) = supervisor.listen(&id).expect("listen");
    assert!(history.is_empty());
    assert_eq!(listener.recv().await, Delivery::Completed);

    assert_eq!(
        supervisor.stop(&id).expect("stop"),
        StopOutcome::AlreadyTerminal(WorkerStatus::Failed)
    );
}

#[tokio::test]
async fn stop_kills_running_worker() {
    init_tracing();

    let (launcher, mut controls) = FakeLauncher::manual(true);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("sleep 100").expect("start");
    let mut control = with_timeout(controls.recv()).await.expect("launched");
    wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    let outcome = supervisor.stop(&id).expect("stop");
    assert_eq!(outcome, StopOutcome::Requested { pid: control.pid });

    with_timeout(control.terminated()).await;
    assert_eq!(
        with_timeout(supervisor.wait(&id)).await.expect("wait"),
        WorkerStatus::Killed
    );

    // Terminal states are sticky and stopping again changes nothing.
    for _ in 0..3 {
        assert_eq!(
            supervisor.stop(&id).expect("stop"),
            StopOutcome::AlreadyTerminal(WorkerStatus::Killed)
        );
    }
    assert_eq!(supervisor.query(&id).expect("query").status, WorkerStatus::Killed);
}

#[tokio::test]
async fn repeated_stop_while_shutting_down_is_requested_again() {
    let (launcher, mut controls) = FakeLauncher::manual(false);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("slow shutdown").expect("start");
    let mut control = with_timeout(controls.recv()).await.expect("launched");
    wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    assert!(matches!(supervisor.stop(&id).expect("stop"), StopOutcome::Requested { .. }));
    with_timeout(control.terminated()).await;
    assert!(matches!(supervisor.stop(&id).expect("stop"), StopOutcome::Requested { .. }));
    assert_eq!(supervisor.query(&id).expect("query").status, WorkerStatus::Running);

    control.exit(ExitResult::failure(-1));
    assert_eq!(
        with_timeout(supervisor.wait(&id)).await.expect("wait"),
        WorkerStatus::Killed
    );
}

#[tokio::test]
async fn output_after_stop_still_reaches_listeners() {
    init_tracing();

    let (launcher, mut controls) = FakeLauncher::manual(false);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("graceful").expect("start");
    let mut control = with_timeout(controls.recv()).await.expect("launched");
    wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    control.emit("working");
    let (_, mut listener) = supervisor.listen(&id).expect("listen");

    supervisor.stop(&id).expect("stop");
    with_timeout(control.terminated()).await;
    control.emit("shutting down");
    control.exit(ExitResult::success());

    let (live, terminal) = with_timeout(listener.drain()).await;
    let texts: Vec<&str> = live.iter().map(|e| e.text.as_str()).collect();
    assert!(texts.ends_with(&["shutting down"]));
    assert_eq!(terminal, Delivery::Completed);

    // Stop was requested, so even a clean exit counts as killed.
    assert_eq!(supervisor.query(&id).expect("query").status, WorkerStatus::Killed);
    assert_eq!(supervisor.query(&id).expect("query").history_length, 2);
}

#[tokio::test]
async fn listener_attached_mid_stream_sees_everything_once() {
    let (launcher, mut controls) = FakeLauncher::manual(true);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("stream").expect("start");
    let control = with_timeout(controls.recv()).await.expect("launched");

    for i in 1..=10 {
        control.emit(&format!("early {i}"));
    }
    wait_for_history(&supervisor, &id, 10).await;

    let (history, mut listener) = supervisor.listen(&id).expect("listen");
    assert_eq!(supervisor.query(&id).expect("query").listener_count, 1);

    for i in 1..=10 {
        control.emit(&format!("late {i}"));
    }
    control.exit(ExitResult::success());

    let (live, terminal) = with_timeout(listener.drain()).await;
    assert_eq!(terminal, Delivery::Completed);

    let seqs: Vec<u64> = history.iter().chain(live.iter()).map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
    assert_eq!(live.first().map(|e| e.seq), Some(listener.replayed_up_to() + 1));
    assert_eq!(supervisor.query(&id).expect("query").listener_count, 0);
}

async fn wait_for_history(supervisor: &procvisor::Supervisor, id: &str, len: usize) {
    with_timeout(async {
        while supervisor.query(id).expect("query").history_length < len {
            tokio::task::yield_now().await;
        }
    })
    .await
}

#[tokio::test]
async fn stop_reaches_process_after_its_output_closed() {
    init_tracing();

    let (launcher, mut controls) = FakeLauncher::manual(true);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("daemonize").expect("start");
    let mut control = with_timeout(controls.recv()).await.expect("launched");
    wait_for_status(&supervisor, &id, WorkerStatus::Running).await;

    control.emit("detaching");
    control.close_output();
    // Let the run loop move on to waiting for the exit status.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(supervisor.query(&id).expect("query").history_length, 1);
    assert_eq!(supervisor.query(&id).expect("query").status, WorkerStatus::Running);

    assert_eq!(
        supervisor.stop(&id).expect("stop"),
        StopOutcome::Requested { pid: control.pid }
    );
    with_timeout(control.terminated()).await;
    assert_eq!(
        with_timeout(supervisor.wait(&id)).await.expect("wait"),
        WorkerStatus::Killed
    );
}

#[tokio::test]
async fn process_without_output_exits_normally_after_close() {
    let (launcher, mut controls) = FakeLauncher::manual(true);
    let supervisor = supervisor_with(Arc::new(launcher));

    let id = supervisor.start("quiet").expect("start");
    let control = with_timeout(controls.recv()).await.expect("launched");

    control.close_output();
    control.exit(ExitResult::success());

    assert_eq!(
        with_timeout(supervisor.wait(&id)).await.expect("wait"),
        WorkerStatus::Completed
    );
    assert!(!control.is_terminated());
}

#[tokio::test]
async fn a_worker_is_launched_at_most_once() {
    let launcher = Arc::new(FakeLauncher::scripted(&["once"], ExitResult::success()));
    let worker = Arc::new(Worker::new("solo".to_string(), "run once", 16));

    assert!(worker.launch(&Handle::current(), launcher.clone()));
    assert!(!worker.launch(&Handle::current(), launcher.clone()));

    assert_eq!(with_timeout(worker.wait()).await, WorkerStatus::Completed);
    assert_eq!(launcher.launched(), vec!["run once".to_string()]);
    assert_eq!(worker.history().len(), 1);
}
