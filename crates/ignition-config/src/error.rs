//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by [`Validate`](crate::Validate) implementations.
pub type ValidationError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during configuration resolution.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    ///
    /// Recoverable when raised for a conventional candidate path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file content could not be parsed.
    #[error("failed to parse {format} configuration from {origin}: {reason}")]
    Parse {
        /// Format the content was parsed as.
        format: &'static str,
        /// Where the content came from (a path or `<string>`).
        origin: String,
        /// Parser message.
        reason: String,
    },

    /// The file extension (or requested format) is not supported.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParse {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },

    /// The merged layers do not fit the target configuration type.
    #[error("failed to decode configuration: {0}")]
    Decode(#[source] serde_json::Error),

    /// The configuration's own validation rejected it.
    #[error("configuration validation failed: {0}")]
    Validation(#[source] ValidationError),
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new parse error.
    pub fn parse(format: &'static str, origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            format,
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParse {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for the recoverable "file is absent" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }
}
