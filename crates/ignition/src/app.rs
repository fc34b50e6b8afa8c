//! The business component contract.

use std::future::Future;

use ignition_server::ShutdownSignal;

/// Error type returned by business components and their factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The caller-supplied unit of application logic.
///
/// `run` is invoked exactly once per orchestrator run. It should return
/// promptly once `shutdown` resolves; returning [`Cancelled`] (or an error
/// whose source chain contains it) is treated as a clean exit.
///
/// # Example
///
/// ```rust
/// use ignition::{BoxError, Cancelled, Runnable, ShutdownSignal};
///
/// struct Worker;
///
/// impl Runnable for Worker {
///     async fn run(self, shutdown: ShutdownSignal) -> Result<(), BoxError> {
///         shutdown.recv().await;
///         Err(Cancelled.into())
///     }
/// }
/// ```
pub trait Runnable: Send + 'static {
    /// Runs the component until it completes or `shutdown` is triggered.
    fn run(self, shutdown: ShutdownSignal) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Marker error for "stopped because the shared context was cancelled".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("context canceled")]
pub struct Cancelled;
