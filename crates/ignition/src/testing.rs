//! Test harness for business components.
//!
//! [`TestRunnerBuilder`] bootstraps a component the way the orchestrator
//! would, minus the process-level concerns: the identity is fixed to
//! `test`/`test`, logs go to a [`MemorySink`], configuration is taken as
//! given (but still validated), OS signals are not touched and the optional
//! HTTP server listens on an ephemeral localhost port.
//!
//! # Example
//!
//! ```rust
//! use ignition::testing::TestRunnerBuilder;
//! use ignition::{BoxError, Runnable, RuntimeContext, ShutdownSignal};
//!
//! struct Hello;
//!
//! impl Runnable for Hello {
//!     async fn run(self, _shutdown: ShutdownSignal) -> Result<(), BoxError> {
//!         tracing::info!("hello");
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let runner = TestRunnerBuilder::new(())
//!     .build(|_ctx: RuntimeContext<()>| Ok::<_, BoxError>(Hello))
//!     .await
//!     .unwrap();
//! let logs = runner.logs().clone();
//!
//! runner.run().await.unwrap();
//! assert_eq!(logs.records()[0]["message"], "hello");
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ignition_config::{ConfigError, Environment, Validate};
use ignition_server::{handlers, HttpSupervisor, ServerConfig, ShutdownSignal};
use ignition_telemetry::{LevelFilter, Logger, LoggerComposer, MemorySink, MetricsRegistry};
use tokio::task::JoinHandle;

use crate::app::{BoxError, Runnable};
use crate::context::{AppIdentity, RuntimeContext};
use crate::error::{is_benign, Error};

/// Name and version every test run reports.
pub const TEST_IDENTITY: &str = "test";

/// Configures a [`TestRunner`].
#[derive(Debug)]
pub struct TestRunnerBuilder<C> {
    config: C,
    env: Environment,
    http: bool,
    grace_period: Duration,
}

impl<C: Validate> TestRunnerBuilder<C> {
    /// Starts from an already resolved configuration.
    pub fn new(config: C) -> Self {
        Self {
            config,
            env: Environment::default(),
            http: false,
            grace_period: Duration::from_secs(1),
        }
    }

    /// Exposes `env` through [`RuntimeContext::env`].
    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Attaches an HTTP server on `127.0.0.1:0` with the health and metrics
    /// handlers installed.
    pub fn http_server(mut self) -> Self {
        self.http = true;
        self
    }

    /// Sets the server grace period (one second by default).
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Validates the configuration, builds the component and starts the
    /// server, if any.
    pub async fn build<F, R, E>(self, factory: F) -> Result<TestRunner<R>, Error>
    where
        F: FnOnce(RuntimeContext<C>) -> Result<R, E>,
        R: Runnable,
        E: Into<BoxError>,
    {
        self.config.validate().map_err(ConfigError::Validation)?;

        let logs = MemorySink::new();
        let logger = LoggerComposer::new()
            .identity(TEST_IDENTITY, TEST_IDENTITY)
            .level(LevelFilter::DEBUG)
            .memory(&logs)
            .compose();
        let shutdown = ShutdownSignal::new();

        let server = if self.http {
            let metrics = MetricsRegistry::new()?.with_identity(TEST_IDENTITY, TEST_IDENTITY);
            let config = ServerConfig::builder()
                .addr("127.0.0.1:0")
                .grace_period(self.grace_period)
                .build();
            let server = HttpSupervisor::with_metrics(config, Arc::new(metrics));
            server.handle(handlers::HEALTH_PATH, handlers::health);
            server.handle(
                handlers::METRICS_PATH,
                handlers::metrics(Arc::clone(server.metrics())),
            );
            Some(Arc::new(server))
        } else {
            None
        };

        let ctx = RuntimeContext::new(
            AppIdentity::new(TEST_IDENTITY, TEST_IDENTITY),
            self.config,
            logger.clone(),
            server.clone(),
            shutdown.clone(),
            self.env,
        );
        let app = logger
            .in_scope(|| factory(ctx))
            .map_err(|e| Error::Init(e.into()))?;

        let addr = match &server {
            Some(server) => Some(logger.instrument(server.start()).await?),
            None => None,
        };

        Ok(TestRunner {
            app,
            logger,
            logs,
            server,
            addr,
            shutdown,
        })
    }
}

/// A bootstrapped component, ready to run.
#[derive(Debug)]
pub struct TestRunner<R> {
    app: R,
    logger: Logger,
    logs: MemorySink,
    server: Option<Arc<HttpSupervisor>>,
    addr: Option<SocketAddr>,
    shutdown: ShutdownSignal,
}

impl<R: Runnable> TestRunner<R> {
    /// Everything logged so far, including by the factory.
    pub fn logs(&self) -> &MemorySink {
        &self.logs
    }

    /// The shared cancellation signal.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// The attached server, if any.
    pub fn server(&self) -> Option<&Arc<HttpSupervisor>> {
        self.server.as_ref()
    }

    /// Full URL of `path` on the attached server.
    pub fn server_url(&self, path: &str) -> Option<String> {
        self.addr.map(|addr| format!("http://{addr}{path}"))
    }

    /// Runs the component to completion, then stops the server.
    ///
    /// Cancellation and "server closed" outcomes count as success.
    pub async fn run(self) -> Result<(), Error> {
        finish(self.app, self.logger, self.shutdown, self.server).await
    }

    /// Runs the component in the background.
    pub fn start(self) -> RunningApp {
        let task = tokio::spawn(finish(
            self.app,
            self.logger,
            self.shutdown.clone(),
            self.server,
        ));
        RunningApp {
            task: Some(task),
            logs: self.logs,
            addr: self.addr,
            shutdown: self.shutdown,
        }
    }
}

/// A component running in the background.
///
/// Dropping it triggers the shutdown signal.
#[derive(Debug)]
pub struct RunningApp {
    task: Option<JoinHandle<Result<(), Error>>>,
    logs: MemorySink,
    addr: Option<SocketAddr>,
    shutdown: ShutdownSignal,
}

impl RunningApp {
    /// Everything logged so far.
    pub fn logs(&self) -> &MemorySink {
        &self.logs
    }

    /// Full URL of `path` on the attached server.
    pub fn server_url(&self, path: &str) -> Option<String> {
        self.addr.map(|addr| format!("http://{addr}{path}"))
    }

    /// Returns `true` once the component has returned.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Triggers shutdown and waits for the component and server to stop.
    pub async fn stop(mut self) -> Result<(), Error> {
        self.shutdown.trigger();
        self.join().await
    }

    /// Waits for the component to return on its own.
    pub async fn wait(mut self) -> Result<(), Error> {
        self.join().await
    }

    async fn join(&mut self) -> Result<(), Error> {
        match self.task.take() {
            Some(task) => task.await.map_err(|e| Error::Run(Box::new(e)))?,
            None => Ok(()),
        }
    }
}

impl Drop for RunningApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn finish<R: Runnable>(
    app: R,
    logger: Logger,
    shutdown: ShutdownSignal,
    server: Option<Arc<HttpSupervisor>>,
) -> Result<(), Error> {
    let result = logger.instrument(app.run(shutdown.clone())).await;
    shutdown.trigger();

    let stopped = match &server {
        Some(server) => logger.instrument(server.stop()).await,
        None => Ok(()),
    };

    match result {
        Err(e) if !is_benign(e.as_ref()) => Err(Error::Run(e)),
        _ => stopped.map_err(Error::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Cancelled;

    #[derive(Debug)]
    struct WaitForShutdown;

    impl Runnable for WaitForShutdown {
        async fn run(self, shutdown: ShutdownSignal) -> Result<(), BoxError> {
            shutdown.recv().await;
            Err(Cancelled.into())
        }
    }

    #[derive(Debug)]
    struct Fail;

    impl Runnable for Fail {
        async fn run(self, _shutdown: ShutdownSignal) -> Result<(), BoxError> {
            Err("boom".into())
        }
    }

    #[derive(Debug)]
    struct Port(u16);

    impl Validate for Port {
        fn validate(&self) -> Result<(), ignition_config::ValidationError> {
            if self.0 == 0 {
                return Err("port must be set".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_identity_and_logs() {
        let runner = TestRunnerBuilder::new(())
            .build(|ctx: RuntimeContext<()>| {
                assert_eq!(ctx.app_name(), "test");
                assert_eq!(ctx.app_version(), "test");
                tracing::debug!("building");
                Ok::<_, BoxError>(Fail)
            })
            .await
            .unwrap();

        let records = runner.logs().records();
        assert_eq!(records[0]["message"], "building");
        assert_eq!(records[0]["app"], "test");
        assert!(runner.server_url("/health").is_none());

        assert!(matches!(runner.run().await, Err(Error::Run(_))));
    }

    #[tokio::test]
    async fn test_validation_runs_before_factory() {
        let result = TestRunnerBuilder::new(Port(0))
            .build(|_ctx: RuntimeContext<Port>| -> Result<Fail, BoxError> {
                panic!("factory must not run")
            })
            .await;

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_factory_error() {
        let result = TestRunnerBuilder::new(Port(8080))
            .build(|_ctx: RuntimeContext<Port>| Err::<Fail, _>("no database"))
            .await;

        match result {
            Err(Error::Init(e)) => assert_eq!(e.to_string(), "no database"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let running = TestRunnerBuilder::new(())
            .build(|_ctx: RuntimeContext<()>| Ok::<_, BoxError>(WaitForShutdown))
            .await
            .unwrap()
            .start();

        tokio::task::yield_now().await;
        assert!(!running.is_finished());

        running.stop().await.unwrap();
    }
}
