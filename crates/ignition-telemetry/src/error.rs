//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The remote log endpoint URL is empty or malformed.
    #[error("Invalid log server URL: {0}")]
    InvalidUrl(String),

    /// The request to the remote log endpoint could not be sent.
    #[error("Log delivery failed: {0}")]
    Transport(String),

    /// The remote log endpoint answered with something other than 201 Created.
    #[error("Invalid response status code: {status}")]
    RemoteStatus {
        /// The status code received.
        status: u16,
    },

    /// Failed to set up the metrics recorder.
    #[error("Failed to initialize metrics: {0}")]
    Metrics(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Converts the error into an [`std::io::Error`] for `Write` implementations.
    pub fn into_io(self) -> std::io::Error {
        match self {
            Self::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
