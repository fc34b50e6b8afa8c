//! Server error types.

use thiserror::Error;

/// Errors reported by the HTTP supervisor.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address cannot be used.
    #[error("Invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to bind the listener.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on a running supervisor.
    #[error("server is already started")]
    AlreadyStarted,

    /// The serve loop terminated abnormally.
    #[error("serve failed: {0}")]
    Serve(String),

    /// The supervisor has been stopped. This is the normal outcome of a
    /// shutdown, not a failure.
    #[error("server closed")]
    Closed,

    /// The metrics registry could not be created.
    #[error(transparent)]
    Metrics(#[from] ignition_telemetry::TelemetryError),
}

impl ServerError {
    /// Returns `true` for the "server closed" condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
