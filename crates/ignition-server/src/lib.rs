//! # Ignition Server
//!
//! A supervised HTTP listener for Ignition applications.
//!
//! - Eager bind: address problems surface from [`HttpSupervisor::start`]
//! - Graceful shutdown bounded by a configurable grace period
//! - A mutable [`ServeMux`], so routes can be added while serving
//! - Request metrics recorded for every response
//!
//! ## Example
//!
//! ```rust,no_run
//! use ignition_server::{handlers, HttpSupervisor, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let supervisor = HttpSupervisor::new(ServerConfig::default())?;
//!     supervisor.handle(handlers::HEALTH_PATH, handlers::health);
//!     supervisor.handle(
//!         handlers::METRICS_PATH,
//!         handlers::metrics(Arc::clone(supervisor.metrics())),
//!     );
//!
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod handlers;
mod mux;
mod shutdown;
mod supervisor;

pub use config::{ServerConfig, ServerConfigBuilder, DEFAULT_ADDR, DEFAULT_GRACE_PERIOD};
pub use error::ServerError;
pub use mux::{text_response, Handler, HandlerFuture, HttpResponse, ServeMux};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};
pub use supervisor::{HttpSupervisor, UNMATCHED};
