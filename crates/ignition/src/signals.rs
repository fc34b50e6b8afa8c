//! OS termination signals.

use ignition_server::ShutdownSignal;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

/// Registers SIGINT and SIGTERM handlers and spawns a task that triggers
/// `shutdown` on the first one received.
///
/// Handlers are registered before this returns, so a signal delivered right
/// after is not lost. The task also ends when `shutdown` is triggered by
/// anything else.
pub(crate) fn listen(shutdown: ShutdownSignal) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        Ok(tokio::spawn(
            async move {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                    () = shutdown.recv() => return,
                };
                tracing::info!(signal = name, "signal received");
                shutdown.trigger();
            }
            .with_current_subscriber(),
        ))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(
            async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            tracing::error!(error = %e, "failed to listen for ctrl-c");
                            return;
                        }
                    }
                    () = shutdown.recv() => return,
                }
                tracing::info!(signal = "ctrl-c", "signal received");
                shutdown.trigger();
            }
            .with_current_subscriber(),
        ))
    }
}
