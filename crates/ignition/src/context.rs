//! The runtime context handed to the business component.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use ignition_config::{env_prefixes, Environment};
use ignition_server::{HttpSupervisor, ShutdownSignal};
use ignition_telemetry::Logger;

/// Version reported when none is configured.
pub const DEFAULT_VERSION: &str = "0.0.1";

/// Application name and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    name: String,
    version: String,
}

impl AppIdentity {
    /// Creates an identity from explicit values.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Resolves the identity.
    ///
    /// The name is `name`, else `APP_NAME`, else the basename of the
    /// directory returned by `cwd`, which is only called in that last case.
    /// The version is `version`, else `APP_VERSION`, else
    /// [`DEFAULT_VERSION`].
    pub fn resolve(
        name: Option<&str>,
        version: Option<&str>,
        env: &Environment,
        cwd: impl FnOnce() -> io::Result<PathBuf>,
    ) -> io::Result<Self> {
        let name = match name.filter(|n| !n.is_empty()).or_else(|| env.get("APP_NAME")) {
            Some(name) => name.to_string(),
            None => cwd()?
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let version = version
            .filter(|v| !v.is_empty())
            .or_else(|| env.get("APP_VERSION"))
            .unwrap_or(DEFAULT_VERSION)
            .to_string();

        Ok(Self { name, version })
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Environment prefixes for this application, `APP` first.
    pub fn env_prefixes(&self) -> Vec<String> {
        env_prefixes(&self.name)
    }
}

/// Everything the business component gets from the bootstrap.
///
/// Built once per run and never mutated afterwards: the configuration has
/// been resolved and validated, and the logger is fully composed.
#[derive(Debug)]
pub struct RuntimeContext<C> {
    identity: AppIdentity,
    config: C,
    logger: Logger,
    server: Option<Arc<HttpSupervisor>>,
    shutdown: ShutdownSignal,
    env: Environment,
}

impl<C> RuntimeContext<C> {
    pub(crate) fn new(
        identity: AppIdentity,
        config: C,
        logger: Logger,
        server: Option<Arc<HttpSupervisor>>,
        shutdown: ShutdownSignal,
        env: Environment,
    ) -> Self {
        Self {
            identity,
            config,
            logger,
            server,
            shutdown,
            env,
        }
    }

    /// Application identity.
    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Application name.
    pub fn app_name(&self) -> &str {
        self.identity.name()
    }

    /// Application version.
    pub fn app_version(&self) -> &str {
        self.identity.version()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Takes the configuration out of the context.
    pub fn into_config(self) -> C {
        self.config
    }

    /// The composed logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The attached HTTP supervisor, if any.
    ///
    /// Routes can be added to it at any time; the orchestrator starts it
    /// once the factory returns.
    pub fn server(&self) -> Option<&Arc<HttpSupervisor>> {
        self.server.as_ref()
    }

    /// The shared cancellation signal.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// The environment the run was bootstrapped from.
    pub fn env(&self) -> &Environment {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd(path: &'static str) -> impl FnOnce() -> io::Result<PathBuf> {
        move || Ok(PathBuf::from(path))
    }

    #[test]
    fn test_resolve_explicit() {
        let env = Environment::from_pairs([("APP_NAME", "from-env"), ("APP_VERSION", "9.9.9")]);
        let identity = AppIdentity::resolve(Some("svc"), Some("1.0.0"), &env, cwd("/srv/app")).unwrap();

        assert_eq!(identity, AppIdentity::new("svc", "1.0.0"));
    }

    #[test]
    fn test_resolve_from_env() {
        let env = Environment::from_pairs([("APP_NAME", "from-env"), ("APP_VERSION", "9.9.9")]);
        let identity = AppIdentity::resolve(None, Some(""), &env, cwd("/srv/app")).unwrap();

        assert_eq!(identity.name(), "from-env");
        assert_eq!(identity.version(), "9.9.9");
    }

    #[test]
    fn test_resolve_defaults() {
        let identity =
            AppIdentity::resolve(None, None, &Environment::default(), cwd("/srv/billing-api"))
                .unwrap();

        assert_eq!(identity.name(), "billing-api");
        assert_eq!(identity.version(), DEFAULT_VERSION);
        assert_eq!(identity.env_prefixes(), vec!["APP", "BILLING_API"]);
    }

    #[test]
    fn test_cwd_only_consulted_as_fallback() {
        let env = Environment::from_pairs([("APP_NAME", "svc")]);
        let identity = AppIdentity::resolve(None, None, &env, || {
            Err(io::Error::other("cwd should not be read"))
        });
        assert_eq!(identity.unwrap().name(), "svc");

        let identity = AppIdentity::resolve(None, None, &Environment::default(), || {
            Err(io::Error::from(io::ErrorKind::NotFound))
        });
        assert!(identity.is_err());
    }

    #[test]
    fn test_context_accessors() {
        let ctx = RuntimeContext::new(
            AppIdentity::new("svc", "1.0.0"),
            42_u32,
            Logger::disabled(),
            None,
            ShutdownSignal::new(),
            Environment::default(),
        );

        assert_eq!(ctx.app_name(), "svc");
        assert_eq!(ctx.app_version(), "1.0.0");
        assert_eq!(*ctx.config(), 42);
        assert!(ctx.server().is_none());
        assert!(!ctx.shutdown().is_shutdown());
        assert_eq!(ctx.into_config(), 42);
    }
}
