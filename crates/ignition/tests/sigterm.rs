//! SIGTERM handling. Kept in its own test binary since it signals the
//! whole process.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use ignition::{
    BoxError, Cancelled, Environment, ExitStatus, MemorySink, Orchestrator, Runnable,
    RuntimeContext, ShutdownSignal, Sink,
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::Notify;

struct Waiter {
    started: Arc<Notify>,
}

impl Runnable for Waiter {
    async fn run(self, shutdown: ShutdownSignal) -> Result<(), BoxError> {
        self.started.notify_one();
        shutdown.recv().await;
        Err(Cancelled.into())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sigterm_cancels_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let logs = MemorySink::new();
    let started = Arc::new(Notify::new());

    let notified = Arc::clone(&started);
    tokio::spawn(async move {
        notified.notified().await;
        kill(Pid::this(), Signal::SIGTERM).unwrap();
    });

    let app_started = Arc::clone(&started);
    let status = tokio::time::timeout(
        Duration::from_secs(10),
        Orchestrator::<(), _>::new(move |_ctx: RuntimeContext<()>| {
            Ok::<_, BoxError>(Waiter {
                started: app_started,
            })
        })
        .with_name("svc")
        .with_env(Environment::default())
        .with_config_dir(dir.path())
        .with_global_logger(false)
        .with_log_sink(Sink::json(logs.clone()))
        .run(),
    )
    .await
    .expect("SIGTERM should end the run");

    assert_eq!(status, ExitStatus::Success);
    let records = logs.records();
    let signal = records
        .iter()
        .find(|r| r["message"] == "signal received")
        .expect("signal logged");
    assert_eq!(signal["signal"], "SIGTERM");
    assert!(records.iter().all(|r| r["level"] != "ERROR"));
}
