//! Structured logging and metrics for Ignition applications.
//!
//! This crate provides the observability pieces an Ignition runtime hands to
//! its business component:
//!
//! - **Logging**: a [`Logger`] fanning every `tracing` event out to N
//!   [`Sink`]s (console, in-memory buffer, remote HTTP endpoint), stamped with
//!   the application name and version
//! - **Remote delivery**: [`HttpSink`], a write-through writer that POSTs each
//!   record to a log server
//! - **Metrics**: a [`MetricsRegistry`] rendering the Prometheus text format,
//!   with the standard HTTP server request metrics
//!
//! # Architecture
//!
//! ```text
//!   tracing::info!(..)
//!          │
//!          ▼
//!   ┌──────────────┐   LevelFilter (INFO, or DEBUG with APP_DEBUG)
//!   │    Logger    │
//!   │  (Dispatch)  │── one fmt layer per sink, stamped with app / app_v
//!   └──────┬───────┘
//!          │ insertion order
//!    ┌─────┼──────────────┐
//!    ▼     ▼              ▼
//! console memory      HttpSink ──► inner writer, then POST (201 expected)
//! ```
//!
//! # Example
//!
//! ```
//! use ignition_telemetry::{LoggerComposer, MemorySink, MetricsRegistry, RequestLabels};
//! use std::time::Duration;
//!
//! let logs = MemorySink::new();
//! let logger = LoggerComposer::new()
//!     .identity("billing-api", "1.4.0")
//!     .memory(&logs)
//!     .compose();
//! logger.in_scope(|| tracing::info!("ready"));
//! assert!(logs.content().contains("ready"));
//!
//! let metrics = MetricsRegistry::new().unwrap().with_identity("billing-api", "1.4.0");
//! metrics.record_http_request(
//!     &RequestLabels { method: "GET", host: "", path: "/health", code: 200 },
//!     Duration::from_millis(2),
//! );
//! assert!(metrics.render().contains("http_server_requests_total"));
//! ```

mod error;
mod http_sink;
mod logging;
mod metrics;

pub use error::TelemetryError;
pub use http_sink::{HttpSink, LogServerConfig, LogTransport, ReqwestTransport};
pub use logging::{debug_enabled, Logger, LoggerComposer, MemorySink, Sink, SinkFormat};
pub use metrics::{
    MetricsRegistry, RequestLabels, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS,
    PROMETHEUS_CONTENT_TYPE,
};
pub use tracing_subscriber::filter::LevelFilter;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
