//! Shutdown coordination.
//!
//! [`ShutdownSignal`] is the single cancellation handle shared by every
//! concurrent unit of an Ignition application: the OS signal listener, the
//! HTTP serve loop and the business component. [`ConnectionTracker`] counts
//! open connections so a shutdown can wait for them to drain.
//!
//! Both are thin wrappers over a `tokio::sync::watch` channel, so late
//! subscribers observe the current state instead of missing a notification.
//!
//! # Example
//!
//! ```rust
//! use ignition_server::ShutdownSignal;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let shutdown = ShutdownSignal::new();
//! let worker = shutdown.clone();
//!
//! let task = tokio::spawn(async move {
//!     tokio::select! {
//!         () = worker.recv() => "cancelled",
//!         () = tokio::time::sleep(Duration::from_secs(60)) => "timed out",
//!     }
//! });
//!
//! shutdown.trigger();
//! assert_eq!(task.await.unwrap(), "cancelled");
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::watch;

/// Cancellation handle. Clones share state and triggering is idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Triggers the signal.
    ///
    /// Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        self.state.send_if_modified(|triggered| !std::mem::replace(triggered, true))
    }

    /// Returns `true` once triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the signal is triggered, immediately if it already was.
    ///
    /// The returned future does not borrow `self` and can be spawned.
    pub fn recv(&self) -> ShutdownReceiver {
        let mut rx = self.state.subscribe();
        ShutdownReceiver {
            inner: Box::pin(async move {
                // The sender lives as long as any `ShutdownSignal` clone; if
                // they are all gone nobody can trigger, so stay pending.
                if rx.wait_for(|triggered| *triggered).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`ShutdownSignal::recv`].
pub struct ShutdownReceiver {
    inner: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl Future for ShutdownReceiver {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for ShutdownReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownReceiver").finish_non_exhaustive()
    }
}

/// Counts open connections.
///
/// ```rust
/// use ignition_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// Creates a tracker with no open connections.
    #[must_use]
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Registers a connection; it counts until the token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.send_modify(|n| *n += 1);
        ConnectionToken {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of connections currently open.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.active.borrow()
    }

    /// Resolves once no connection is open.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // `self` keeps the sender alive, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one connection counted while alive.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}
