//! # Ignition
//!
//! Application bootstrap and lifecycle orchestration.
//!
//! Give Ignition a factory that builds your business component from a
//! [`RuntimeContext`], and it takes care of the rest of the process:
//!
//! - **Configuration**: conventional files, explicit `APP_CONFIG_PATH` /
//!   `<PREFIX>_CONFIG_PATH` files and environment variables, layered onto
//!   your serde type and validated once
//! - **Logging**: every `tracing` event fanned out to the configured sinks
//!   (console, in-memory, remote HTTP) and stamped with `app` / `app_v`
//! - **HTTP**: an optional supervised server with `/health` and `/metrics`
//! - **Shutdown**: SIGINT/SIGTERM (or your own [`ShutdownSignal`]) cancel
//!   the component, and the server drains within a bounded grace period
//!
//! ## Crate Structure
//!
//! | Crate | Description |
//! |-------|-------------|
//! | `ignition-config` | Layered configuration resolution |
//! | `ignition-telemetry` | Multi-sink logging and Prometheus metrics |
//! | `ignition-server` | HTTP supervisor with graceful shutdown |
//! | `ignition` | The lifecycle orchestrator (this crate) |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ignition::{BoxError, ExitStatus, Orchestrator, Runnable, RuntimeContext, ShutdownSignal};
//!
//! struct Worker;
//!
//! impl Runnable for Worker {
//!     async fn run(self, shutdown: ShutdownSignal) -> Result<(), BoxError> {
//!         tracing::info!("working");
//!         shutdown.recv().await;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> ExitStatus {
//!     Orchestrator::<(), _>::new(|_ctx: RuntimeContext<()>| Ok::<_, BoxError>(Worker))
//!         .with_console_sink()
//!         .with_default_http_server()
//!         .with_default_health_handler()
//!         .block_on()
//! }
//! ```

mod app;
mod context;
mod error;
mod exit;
mod orchestrator;
mod signals;
pub mod testing;

pub use app::{BoxError, Cancelled, Runnable};
pub use context::{AppIdentity, RuntimeContext, DEFAULT_VERSION};
pub use error::{is_benign, Error};
pub use exit::ExitStatus;
pub use orchestrator::{Orchestrator, Phase};

/// Re-export of the configuration crate.
pub use ignition_config as config;

/// Re-export of the HTTP server crate.
pub use ignition_server as server;

/// Re-export of the logging and metrics crate.
pub use ignition_telemetry as telemetry;

pub use ignition_config::{ConfigError, Environment, Validate, ValidationError};
pub use ignition_server::{handlers, HttpSupervisor, ServerConfig, ServerError, ShutdownSignal};
pub use ignition_telemetry::{Logger, MemorySink, MetricsRegistry, Sink, SinkFormat};

/// Everything a typical `main.rs` needs.
///
/// ```rust
/// use ignition::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BoxError, Cancelled, Environment, ExitStatus, Orchestrator, Runnable, RuntimeContext,
        ShutdownSignal, Sink, Validate,
    };
}
