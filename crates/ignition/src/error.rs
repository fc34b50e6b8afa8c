//! Top-level error type.

use std::error::Error as StdError;

use ignition_config::ConfigError;
use ignition_server::ServerError;
use ignition_telemetry::TelemetryError;
use thiserror::Error;

use crate::app::{BoxError, Cancelled};

/// Errors that end an orchestrator run with a failure status.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be resolved or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A logging or metrics collaborator could not be built.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The HTTP supervisor failed to start, serve or stop.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The application name could not be derived from the working directory.
    #[error("unable to determine the application name: {0}")]
    Identity(#[source] std::io::Error),

    /// A second HTTP server was attached.
    #[error("http server is already set")]
    DuplicateServer,

    /// A default handler was requested before any HTTP server was attached.
    #[error("http server is not set, cannot add the {0} handler")]
    ServerNotSet(&'static str),

    /// The OS signal listener could not be registered.
    #[error("failed to listen for termination signals: {0}")]
    Signal(#[source] std::io::Error),

    /// The factory failed to build the business component.
    #[error("app init failed: {0}")]
    Init(#[source] BoxError),

    /// The business component returned a failure.
    #[error("app run failed: {0}")]
    Run(#[source] BoxError),
}

impl Error {
    /// Short description used as the terminal log message.
    pub(crate) fn summary(&self) -> &'static str {
        match self {
            Self::Config(ConfigError::Validation(_)) => "config validation failed",
            Self::Config(_) => "config load failed",
            Self::Telemetry(_) => "telemetry setup failed",
            Self::Server(_) => "http server failed",
            Self::Identity(_) | Self::DuplicateServer | Self::ServerNotSet(_) => {
                "app setup failed"
            }
            Self::Signal(_) => "signal handling setup failed",
            Self::Init(_) => "app init failed",
            Self::Run(_) => "app run failed",
        }
    }

    /// The error to report next to [`summary`](Self::summary).
    pub(crate) fn detail(&self) -> String {
        match self {
            Self::Init(source) | Self::Run(source) => source.to_string(),
            other => other.to_string(),
        }
    }
}

/// Returns `true` when `err`, or anything in its source chain, means the run
/// was cancelled or the server was closed.
pub fn is_benign(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<Cancelled>()
            || err
                .downcast_ref::<ServerError>()
                .is_some_and(ServerError::is_closed)
        {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("worker stopped")]
    struct Wrapped(#[source] BoxError);

    #[test]
    fn test_benign_errors() {
        assert!(is_benign(&Cancelled));
        assert!(is_benign(&ServerError::Closed));
        assert!(is_benign(&Wrapped(Box::new(Cancelled))));
        assert!(is_benign(&Wrapped(Box::new(Wrapped(Box::new(
            ServerError::Closed
        ))))));
    }

    #[test]
    fn test_failures_are_not_benign() {
        assert!(!is_benign(&ServerError::Serve("reset".to_string())));
        assert!(!is_benign(&Wrapped("boom".into())));

        let boxed: BoxError = "boom".into();
        assert!(!is_benign(boxed.as_ref()));
    }

    #[test]
    fn test_summary_and_detail() {
        let err = Error::Run("boom".into());
        assert_eq!(err.summary(), "app run failed");
        assert_eq!(err.detail(), "boom");
        assert_eq!(err.to_string(), "app run failed: boom");

        let err = Error::Config(ConfigError::Validation("port is zero".into()));
        assert_eq!(err.summary(), "config validation failed");

        assert_eq!(Error::DuplicateServer.to_string(), "http server is already set");
    }
}
