//! The lifecycle orchestrator.
//!
//! An [`Orchestrator`] takes an application from process start to exit:
//!
//! ```text
//! Init ──► Configuring ──► Running ──► ShuttingDown ──► Stopped
//!  │          │               │             │
//!  identity   options,        factory,      server drained
//!             logger,         server start, within the
//!             config,         business run  grace period
//!             signals
//! ```
//!
//! Every failure before the business component runs aborts the run; every
//! failure ends up as a single error-level log line and [`ExitStatus::Failure`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ignition_config::{ConfigResolver, Environment, Validate};
use ignition_server::{
    handlers, HttpSupervisor, ServerConfig, ServerError, ShutdownSignal, DEFAULT_GRACE_PERIOD,
};
use ignition_telemetry::{
    debug_enabled, HttpSink, LogServerConfig, Logger, LoggerComposer, MetricsRegistry, Sink,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::{BoxError, Runnable};
use crate::context::{AppIdentity, RuntimeContext};
use crate::error::{is_benign, Error};
use crate::exit::ExitStatus;
use crate::signals;

/// Lifecycle phases, in the order a run goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Identity resolution.
    Init,
    /// Options, logger, configuration and signal handling.
    Configuring,
    /// The business component (and HTTP server) are running.
    Running,
    /// Cancellation has been requested; the HTTP server is draining.
    ShuttingDown,
    /// The run is over.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Configuring => "configuring",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A deferred option, applied in call order once the identity is known.
enum Setup {
    Sink(Sink),
    ConsoleSink,
    DefaultHttpLogSink,
    Server(HttpSupervisor),
    DefaultServer,
    HealthHandler,
    MetricsHandler,
}

/// Drives one application run.
///
/// `F` builds the business component from the [`RuntimeContext`]; `C` is the
/// caller's configuration type.
///
/// # Example
///
/// ```rust,no_run
/// use ignition::{BoxError, ExitStatus, Orchestrator, Runnable, RuntimeContext, ShutdownSignal};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct Config {
///     greeting: String,
/// }
///
/// impl ignition::Validate for Config {}
///
/// struct App {
///     greeting: String,
/// }
///
/// impl Runnable for App {
///     async fn run(self, shutdown: ShutdownSignal) -> Result<(), BoxError> {
///         tracing::info!(greeting = %self.greeting, "hello");
///         shutdown.recv().await;
///         Ok(())
///     }
/// }
///
/// fn main() -> ExitStatus {
///     Orchestrator::<Config, _>::new(|ctx: RuntimeContext<Config>| {
///         Ok::<_, BoxError>(App { greeting: ctx.config().greeting.clone() })
///     })
///     .with_console_sink()
///     .with_default_http_server()
///     .with_default_health_handler()
///     .with_default_metrics_handler()
///     .block_on()
/// }
/// ```
pub struct Orchestrator<C, F> {
    factory: F,
    config: C,
    name: Option<String>,
    version: Option<String>,
    env: Option<Environment>,
    config_dir: Option<PathBuf>,
    setup: Vec<Setup>,
    shutdown: Option<ShutdownSignal>,
    signals: bool,
    global_logger: bool,
    grace_period: Duration,
    phase: watch::Sender<Phase>,
}

impl<C: Default, F> Orchestrator<C, F> {
    /// Creates an orchestrator for the component built by `factory`.
    pub fn new(factory: F) -> Self {
        let (phase, _) = watch::channel(Phase::Init);
        Self {
            factory,
            config: C::default(),
            name: None,
            version: None,
            env: None,
            config_dir: None,
            setup: Vec::new(),
            shutdown: None,
            signals: true,
            global_logger: true,
            grace_period: DEFAULT_GRACE_PERIOD,
            phase,
        }
    }
}

impl<C, F> Orchestrator<C, F> {
    /// Sets the application name instead of reading `APP_NAME`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the application version instead of reading `APP_VERSION`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Uses `env` instead of the process environment.
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Looks for conventional config files in `dir` instead of the working
    /// directory.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Sets the value configuration layers are applied on top of.
    pub fn with_config(mut self, config: C) -> Self {
        self.config = config;
        self
    }

    /// Adds a log sink.
    pub fn with_log_sink(mut self, sink: Sink) -> Self {
        self.setup.push(Setup::Sink(sink));
        self
    }

    /// Adds the console sink: pretty on a terminal, JSON otherwise.
    pub fn with_console_sink(mut self) -> Self {
        self.setup.push(Setup::ConsoleSink);
        self
    }

    /// Adds a remote log sink configured from `<PREFIX>_LOGSERVER_*`.
    ///
    /// A missing or invalid URL disables remote logging with a warning.
    pub fn with_default_http_log_sink(mut self) -> Self {
        self.setup.push(Setup::DefaultHttpLogSink);
        self
    }

    /// Attaches an HTTP server. Attaching a second one fails the run.
    pub fn with_http_server(mut self, server: HttpSupervisor) -> Self {
        self.setup.push(Setup::Server(server));
        self
    }

    /// Attaches an HTTP server listening on `<PREFIX>_HTTPSERVER_ADDR`
    /// (default `:9000`), with metrics labelled by the app identity.
    pub fn with_default_http_server(mut self) -> Self {
        self.setup.push(Setup::DefaultServer);
        self
    }

    /// Serves `GET /health` on the attached server.
    pub fn with_default_health_handler(mut self) -> Self {
        self.setup.push(Setup::HealthHandler);
        self
    }

    /// Serves `GET /metrics` on the attached server.
    pub fn with_default_metrics_handler(mut self) -> Self {
        self.setup.push(Setup::MetricsHandler);
        self
    }

    /// Uses a caller-owned cancellation signal.
    ///
    /// Triggering it has the same effect as SIGTERM.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Enables or disables the SIGINT/SIGTERM listener (enabled by default).
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.signals = enabled;
        self
    }

    /// Enables or disables installing the logger as the process-wide
    /// `tracing` default (enabled by default).
    pub fn with_global_logger(mut self, enabled: bool) -> Self {
        self.global_logger = enabled;
        self
    }

    /// Sets the grace period of the default HTTP server.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Watches the lifecycle phase.
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }
}

impl<C, F> Orchestrator<C, F>
where
    C: Serialize + DeserializeOwned + Validate + Send,
{
    /// Runs the application and reports how it ended.
    pub async fn run<R, E>(self) -> ExitStatus
    where
        F: FnOnce(RuntimeContext<C>) -> Result<R, E>,
        R: Runnable,
        E: Into<BoxError>,
    {
        self.try_run().await.into()
    }

    /// Like [`run`](Self::run), returning the error that ended the run.
    ///
    /// The error has already been logged.
    pub async fn try_run<R, E>(self) -> Result<(), Error>
    where
        F: FnOnce(RuntimeContext<C>) -> Result<R, E>,
        R: Runnable,
        E: Into<BoxError>,
    {
        let Self {
            factory,
            config,
            name,
            version,
            env,
            config_dir,
            setup,
            shutdown,
            signals,
            global_logger,
            grace_period,
            phase,
        } = self;
        let phase = PhaseTracker(phase);
        let env = env.unwrap_or_else(Environment::from_process);

        let identity =
            match AppIdentity::resolve(name.as_deref(), version.as_deref(), &env, std::env::current_dir) {
                Ok(identity) => identity,
                Err(e) => {
                    let err = Error::Identity(e);
                    LoggerComposer::new()
                        .console()
                        .compose()
                        .in_scope(|| report(&err));
                    return Err(err);
                }
            };

        phase.enter(Phase::Configuring);
        let mut bootstrap = Bootstrap::new(&identity, &env, grace_period);
        let mut setup_error = None;
        for step in setup {
            if let Err(e) = bootstrap.apply(step) {
                setup_error.get_or_insert(e);
            }
        }
        let Bootstrap {
            composer,
            server,
            warnings,
            ..
        } = bootstrap;

        let composer = if composer.sink_count() == 0 {
            composer.console()
        } else {
            composer
        };
        let logger = composer.compose();
        let installed = global_logger && logger.try_install_global();

        let lifecycle = Lifecycle {
            factory,
            config,
            config_dir,
            identity,
            env,
            logger: logger.clone(),
            server,
            shutdown: shutdown.unwrap_or_default(),
            signals,
            phase,
        };

        logger
            .instrument(async move {
                if global_logger && !installed {
                    tracing::debug!("global logger already set, keeping it");
                }
                for reason in warnings {
                    tracing::warn!(%reason, "http logging is disabled");
                }

                let result = match setup_error {
                    Some(e) => Err(e),
                    None => lifecycle.run().await,
                };
                if let Err(e) = &result {
                    report(e);
                }
                result
            })
            .await
    }

    /// Runs the application on a new multi-threaded tokio runtime.
    ///
    /// Meant to be returned from `main`.
    pub fn block_on<R, E>(self) -> ExitStatus
    where
        F: FnOnce(RuntimeContext<C>) -> Result<R, E>,
        R: Runnable,
        E: Into<BoxError>,
    {
        match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.run()),
            Err(e) => {
                LoggerComposer::new().console().compose().in_scope(|| {
                    tracing::error!(error = %e, "failed to start async runtime");
                });
                ExitStatus::Failure
            }
        }
    }
}

impl<C, F> fmt::Debug for Orchestrator<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("options", &self.setup.len())
            .field("signals", &self.signals)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

fn report(err: &Error) {
    tracing::error!(error = %err.detail(), "{}", err.summary());
}

/// Publishes phase changes; always ends in [`Phase::Stopped`].
struct PhaseTracker(watch::Sender<Phase>);

impl PhaseTracker {
    fn enter(&self, phase: Phase) {
        tracing::debug!(%phase, "lifecycle phase");
        self.0.send_replace(phase);
    }
}

impl Drop for PhaseTracker {
    fn drop(&mut self) {
        self.0.send_replace(Phase::Stopped);
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Option application state.
struct Bootstrap<'a> {
    identity: &'a AppIdentity,
    env: &'a Environment,
    prefixes: Vec<String>,
    grace_period: Duration,
    composer: LoggerComposer,
    server: Option<HttpSupervisor>,
    warnings: Vec<String>,
}

impl<'a> Bootstrap<'a> {
    fn new(identity: &'a AppIdentity, env: &'a Environment, grace_period: Duration) -> Self {
        let prefixes = identity.env_prefixes();
        let composer = LoggerComposer::new()
            .identity(identity.name(), identity.version())
            .debug(debug_enabled(env, &prefixes));
        Self {
            identity,
            env,
            prefixes,
            grace_period,
            composer,
            server: None,
            warnings: Vec::new(),
        }
    }

    fn apply(&mut self, step: Setup) -> Result<(), Error> {
        match step {
            Setup::Sink(sink) => self.add_sink(sink),
            Setup::ConsoleSink => self.add_sink(Sink::console()),
            Setup::DefaultHttpLogSink => self.add_http_log_sink(),
            Setup::Server(server) => self.attach(server)?,
            Setup::DefaultServer => {
                let server = self.default_server()?;
                self.attach(server)?;
            }
            Setup::HealthHandler => {
                self.server("health")?
                    .handle(handlers::HEALTH_PATH, handlers::health);
            }
            Setup::MetricsHandler => {
                let server = self.server("metrics")?;
                server.handle(
                    handlers::METRICS_PATH,
                    handlers::metrics(Arc::clone(server.metrics())),
                );
            }
        }
        Ok(())
    }

    fn add_sink(&mut self, sink: Sink) {
        self.composer = std::mem::take(&mut self.composer).sink(sink);
    }

    fn add_http_log_sink(&mut self) {
        let Some(config) = LogServerConfig::from_env(self.env, &self.prefixes) else {
            let vars: Vec<_> = self
                .prefixes
                .iter()
                .map(|p| format!("{p}_LOGSERVER_URL"))
                .collect();
            self.warnings
                .push(format!("{} not set", vars.join(" or ")));
            return;
        };

        match HttpSink::new(&config) {
            Ok(sink) => self.add_sink(Sink::json(sink)),
            Err(e) => self.warnings.push(e.to_string()),
        }
    }

    fn default_server(&self) -> Result<HttpSupervisor, Error> {
        let addr = ServerConfig::from_env(self.env, &self.prefixes);
        let config = ServerConfig::builder()
            .addr(addr.addr())
            .grace_period(self.grace_period)
            .build();
        let metrics = MetricsRegistry::new()?
            .with_identity(self.identity.name(), self.identity.version());
        Ok(HttpSupervisor::with_metrics(config, Arc::new(metrics)))
    }

    fn attach(&mut self, server: HttpSupervisor) -> Result<(), Error> {
        if self.server.is_some() {
            return Err(Error::DuplicateServer);
        }
        self.server = Some(server);
        Ok(())
    }

    fn server(&self, handler: &'static str) -> Result<&HttpSupervisor, Error> {
        self.server.as_ref().ok_or(Error::ServerNotSet(handler))
    }
}

/// Everything left to do once the logger is composed.
struct Lifecycle<C, F> {
    factory: F,
    config: C,
    config_dir: Option<PathBuf>,
    identity: AppIdentity,
    env: Environment,
    logger: Logger,
    server: Option<HttpSupervisor>,
    shutdown: ShutdownSignal,
    signals: bool,
    phase: PhaseTracker,
}

impl<C, F> Lifecycle<C, F>
where
    C: Serialize + DeserializeOwned + Validate + Send,
{
    async fn run<R, E>(self) -> Result<(), Error>
    where
        F: FnOnce(RuntimeContext<C>) -> Result<R, E>,
        R: Runnable,
        E: Into<BoxError>,
    {
        let Self {
            factory,
            config,
            config_dir,
            identity,
            env,
            logger,
            server,
            shutdown,
            signals,
            phase,
        } = self;

        let mut resolver = ConfigResolver::new(identity.name(), env.clone());
        if let Some(dir) = config_dir {
            resolver = resolver.search_dir(dir);
        }
        let config = resolver.resolve(config)?;

        let _listener = if signals {
            Some(AbortOnDrop(
                signals::listen(shutdown.clone()).map_err(Error::Signal)?,
            ))
        } else {
            None
        };

        let server = server.map(Arc::new);
        let ctx = RuntimeContext::new(
            identity,
            config,
            logger,
            server.clone(),
            shutdown.clone(),
            env,
        );
        let app = factory(ctx).map_err(|e| Error::Init(e.into()))?;

        phase.enter(Phase::Running);
        if let Some(server) = &server {
            server.start().await?;
        }
        tracing::info!("app started");

        let run = app.run(shutdown.clone());
        tokio::pin!(run);

        // A stop initiated by the component itself is not a failure; keep
        // waiting on the run in that case.
        let mut serve_error = None;
        let finished = tokio::select! {
            result = &mut run => Some(result),
            () = shutdown.recv() => None,
            Err(e) = wait_server(server.as_deref()) => {
                serve_error = Some(e);
                None
            }
        };

        phase.enter(Phase::ShuttingDown);
        shutdown.trigger();
        let (result, stopped) = match finished {
            Some(result) => (result, stop_server(server.as_deref()).await),
            None => {
                tracing::info!("shutting down");
                tokio::join!(&mut run, stop_server(server.as_deref()))
            }
        };
        phase.enter(Phase::Stopped);

        if let Some(e) = serve_error {
            return Err(Error::Server(e));
        }
        match result {
            Err(e) if !is_benign(e.as_ref()) => return Err(Error::Run(e)),
            _ => {}
        }
        stopped?;

        tracing::info!("app stopped");
        Ok(())
    }
}

/// Resolves with the serve loop's outcome, never without a server.
async fn wait_server(server: Option<&HttpSupervisor>) -> Result<(), ServerError> {
    match server {
        Some(server) => server.wait().await,
        None => std::future::pending().await,
    }
}

async fn stop_server(server: Option<&HttpSupervisor>) -> Result<(), ServerError> {
    match server {
        Some(server) => server.stop().await,
        None => Ok(()),
    }
}
