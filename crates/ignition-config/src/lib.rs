//! Layered configuration resolution for Ignition applications.
//!
//! This crate populates a caller-defined, serde-typed configuration value from
//! an ordered list of sources:
//! - Conventional files (`config.yaml`, `config.yml`, `config.json`, then the
//!   same names with the application name as base)
//! - Explicit files named by `APP_CONFIG_PATH` / `<PREFIX>_CONFIG_PATH`
//! - Environment variables under `APP_` and the application's own prefix
//!
//! Each layer overrides the fields set by the one before it. Missing
//! conventional files are skipped; everything else that goes wrong is a
//! [`ConfigError`].
//!
//! # Example
//!
//! ```no_run
//! use ignition_config::{ConfigResolver, Environment, Validate, ValidationError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Settings {
//!     database_url: String,
//!     pool_size: u32,
//! }
//!
//! impl Validate for Settings {
//!     fn validate(&self) -> Result<(), ValidationError> {
//!         if self.pool_size == 0 {
//!             return Err("pool_size must be positive".into());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), ignition_config::ConfigError> {
//! let settings: Settings = ConfigResolver::new("billing-api", Environment::from_process())
//!     .resolve(Settings::default())?;
//! # Ok(())
//! # }
//! ```

mod env;
mod error;
mod loader;
mod resolver;

pub use env::{env_prefixes, sanitize_prefix, Environment, DEFAULT_PREFIX};
pub use error::{ConfigError, ValidationError};
pub use loader::{ConfigLoader, Format};
pub use resolver::ConfigResolver;

/// Optional validation capability of a configuration type.
///
/// The default implementation accepts every value, so types without rules
/// only need an empty `impl Validate for MyConfig {}`.
pub trait Validate {
    /// Check the fully resolved configuration.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for () {}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.as_ref().map_or(Ok(()), Validate::validate)
    }
}
