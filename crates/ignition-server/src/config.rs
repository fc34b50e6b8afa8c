//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use ignition_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .addr(":8080")
//!     .grace_period(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.addr(), ":8080");
//! assert_eq!(config.bind_addr().unwrap(), "0.0.0.0:8080");
//! ```

use std::time::Duration;

use ignition_config::Environment;

use crate::ServerError;

/// Default listen address.
pub const DEFAULT_ADDR: &str = ":9000";

/// Default time in-flight requests get to complete on shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Suffix of the variable naming the listen address.
const ADDR_SUFFIX: &str = "HTTPSERVER_ADDR";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    addr: String,
    grace_period: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Reads the address from `<PREFIX>_HTTPSERVER_ADDR`, first prefix wins.
    ///
    /// Falls back to [`DEFAULT_ADDR`].
    pub fn from_env(env: &Environment, prefixes: &[String]) -> Self {
        let addr = env.first(prefixes, ADDR_SUFFIX).unwrap_or(DEFAULT_ADDR);
        Self::builder().addr(addr).build()
    }

    /// Returns the configured address, as given.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns the shutdown grace period.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns the address to bind.
    ///
    /// A missing host (`":9000"`) means all interfaces.
    pub fn bind_addr(&self) -> Result<String, ServerError> {
        let invalid = |reason: &str| ServerError::InvalidAddress {
            addr: self.addr.clone(),
            reason: reason.to_string(),
        };

        let (host, port) = self
            .addr
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        if host.is_empty() {
            Ok(format!("0.0.0.0:{port}"))
        } else {
            Ok(self.addr.clone())
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    addr: String,
    grace_period: Duration,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the listen address (`"host:port"` or `":port"`).
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets how long in-flight requests may run once shutdown starts.
    #[must_use]
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            addr: self.addr,
            grace_period: self.grace_period,
        }
    }
}
