//! The HTTP supervisor.
//!
//! [`HttpSupervisor`] owns one listener and one [`ServeMux`]. `start` binds
//! eagerly and spawns the serve loop; `stop` closes the listener, lets
//! in-flight requests finish within the grace period and then drops whatever
//! is left.
//!
//! # Example
//!
//! ```rust,no_run
//! use ignition_server::{handlers, HttpSupervisor, ServerConfig};
//!
//! # async fn example() -> Result<(), ignition_server::ServerError> {
//! let supervisor = HttpSupervisor::new(ServerConfig::builder().addr("127.0.0.1:8080").build())?;
//! supervisor.handle(handlers::HEALTH_PATH, handlers::health);
//!
//! let addr = supervisor.start().await?;
//! println!("listening on {addr}");
//!
//! supervisor.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{header, Request, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use ignition_telemetry::{MetricsRegistry, RequestLabels};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::mux::{text_response, HttpResponse};
use crate::{ConnectionTracker, ServeMux, ServerConfig, ServerError, ShutdownSignal};

/// Path label recorded for requests no route matched.
pub const UNMATCHED: &str = "unmatched";

type Outcome = Option<Result<(), String>>;

enum State {
    Idle,
    Running {
        local_addr: SocketAddr,
        shutdown: ShutdownSignal,
        task: JoinHandle<Result<(), String>>,
        #[cfg_attr(not(any(test, feature = "test-support")), allow(dead_code))]
        faults: mpsc::UnboundedSender<io::Error>,
    },
    Stopped,
}

/// Supervises a single HTTP listener.
///
/// A supervisor runs at most once: after [`stop`](Self::stop) it cannot be
/// started again.
pub struct HttpSupervisor {
    config: ServerConfig,
    mux: ServeMux,
    metrics: Arc<MetricsRegistry>,
    state: Mutex<State>,
    outcome: Arc<watch::Sender<Outcome>>,
}

impl HttpSupervisor {
    /// Creates an idle supervisor with its own metrics registry.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let metrics = Arc::new(MetricsRegistry::new()?);
        Ok(Self::with_metrics(config, metrics))
    }

    /// Creates an idle supervisor recording into `metrics`.
    pub fn with_metrics(config: ServerConfig, metrics: Arc<MetricsRegistry>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            config,
            mux: ServeMux::new(),
            metrics,
            state: Mutex::new(State::Idle),
            outcome: Arc::new(outcome),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the route table. Routes may be added at any time.
    pub fn mux(&self) -> &ServeMux {
        &self.mux
    }

    /// Shorthand for `self.mux().handle(pattern, handler)`.
    pub fn handle<F, Fut>(&self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.mux.handle(pattern, handler);
    }

    /// Returns the registry request metrics are recorded into.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock() {
            State::Running { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// Returns `true` between a successful `start` and `stop`.
    pub fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), State::Running { .. })
    }

    /// Binds the listener and starts serving in the background.
    ///
    /// Bind failures are returned here, before any request is accepted.
    ///
    /// # Errors
    ///
    /// - [`ServerError::InvalidAddress`] / [`ServerError::Bind`] if the
    ///   address cannot be bound
    /// - [`ServerError::AlreadyStarted`] if already running
    /// - [`ServerError::Closed`] if the supervisor was stopped
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        self.ensure_idle()?;

        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let mut state = self.state.lock();
        // Another caller may have won the race while we were binding.
        match &*state {
            State::Idle => {}
            State::Running { .. } => return Err(ServerError::AlreadyStarted),
            State::Stopped => return Err(ServerError::Closed),
        }

        let shutdown = ShutdownSignal::new();
        let (faults, fault_rx) = mpsc::unbounded_channel();
        let serve = ServeLoop {
            listener,
            routes: Arc::new(Routes {
                mux: self.mux.clone(),
                metrics: Arc::clone(&self.metrics),
            }),
            shutdown: shutdown.clone(),
            grace_period: self.config.grace_period(),
            faults: fault_rx,
        };
        let outcome = Arc::clone(&self.outcome);
        let task = tokio::spawn(
            async move {
                let result = serve.run().await;
                outcome.send_replace(Some(result.clone()));
                result
            }
            .with_current_subscriber(),
        );

        tracing::info!(addr = %local_addr, "http server listening");
        *state = State::Running {
            local_addr,
            shutdown,
            task,
            faults,
        };
        Ok(local_addr)
    }

    /// Waits for the serve loop to end.
    ///
    /// Returns `Ok(())` when it ended because of [`stop`](Self::stop). If the
    /// supervisor has not been started yet, waits for it to be started and
    /// then stopped.
    pub async fn wait(&self) -> Result<(), ServerError> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ServerError::Closed)?
            .clone();
        match outcome {
            Some(Err(reason)) => Err(ServerError::Serve(reason)),
            _ => Ok(()),
        }
    }

    /// Starts the supervisor if needed and blocks until it stops.
    pub async fn run(&self) -> Result<(), ServerError> {
        match self.start().await {
            Ok(_) | Err(ServerError::AlreadyStarted) => {}
            Err(e) => return Err(e),
        }
        self.wait().await
    }

    /// Stops the supervisor.
    ///
    /// Returns once every connection has finished or the grace period has
    /// elapsed and the remaining connections have been dropped. Stopping a
    /// supervisor that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let previous = {
            let mut state = self.state.lock();
            if !matches!(*state, State::Running { .. }) {
                return Ok(());
            }
            std::mem::replace(&mut *state, State::Stopped)
        };

        let State::Running { shutdown, task, .. } = previous else {
            return Ok(());
        };

        shutdown.trigger();
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ServerError::Serve(reason)),
            Err(e) => Err(ServerError::Serve(e.to_string())),
        }
    }

    /// Hands `err` to the serve loop as if `accept` had returned it.
    ///
    /// Does nothing unless the supervisor is running.
    #[cfg(any(test, feature = "test-support"))]
    pub fn inject_accept_error(&self, err: io::Error) {
        if let State::Running { faults, .. } = &*self.state.lock() {
            let _ = faults.send(err);
        }
    }

    fn ensure_idle(&self) -> Result<(), ServerError> {
        match &*self.state.lock() {
            State::Idle => Ok(()),
            State::Running { .. } => Err(ServerError::AlreadyStarted),
            State::Stopped => Err(ServerError::Closed),
        }
    }
}

impl Drop for HttpSupervisor {
    fn drop(&mut self) {
        if let State::Running { shutdown, .. } = &*self.state.lock() {
            shutdown.trigger();
        }
    }
}

impl std::fmt::Debug for HttpSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSupervisor")
            .field("config", &self.config)
            .field("mux", &self.mux)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

struct Routes {
    mux: ServeMux,
    metrics: Arc<MetricsRegistry>,
}

impl Routes {
    async fn dispatch(&self, req: Request<Incoming>) -> HttpResponse {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| req.uri().host())
            .unwrap_or_default()
            .to_string();

        let (pattern, response) = match self.mux.route(&path) {
            Some((pattern, handler)) => (pattern, handler(req).await),
            None => (
                UNMATCHED.to_string(),
                text_response(StatusCode::NOT_FOUND, "404 page not found"),
            ),
        };

        let code = response.status().as_u16();
        let elapsed = started.elapsed();
        self.metrics.record_http_request(
            &RequestLabels {
                method: method.as_str(),
                host: &host,
                path: &pattern,
                code,
            },
            elapsed,
        );
        tracing::debug!(
            method = %method,
            path = %path,
            code,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "request served"
        );

        response
    }
}

struct ServeLoop {
    listener: TcpListener,
    routes: Arc<Routes>,
    shutdown: ShutdownSignal,
    grace_period: Duration,
    faults: mpsc::UnboundedReceiver<io::Error>,
}

impl ServeLoop {
    async fn run(self) -> Result<(), String> {
        let Self {
            listener,
            routes,
            shutdown,
            grace_period,
            mut faults,
        } = self;
        let tracker = ConnectionTracker::new();
        let force = ShutdownSignal::new();

        let result = loop {
            let accepted = tokio::select! {
                () = shutdown.recv() => break Ok(()),
                accepted = listener.accept() => accepted,
                Some(e) = faults.recv() => Err(e),
            };
            match accepted {
                Ok((stream, remote_addr)) => {
                    let token = tracker.acquire();
                    let connection = serve_connection(
                        stream,
                        remote_addr,
                        Arc::clone(&routes),
                        shutdown.clone(),
                        force.clone(),
                    );
                    tokio::spawn(
                        async move {
                            connection.await;
                            drop(token);
                        }
                        .with_current_subscriber(),
                    );
                }
                Err(e) if is_transient(&e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept loop failed");
                    shutdown.trigger();
                    break Err(e.to_string());
                }
            }
        };

        drop(listener);
        drain(&tracker, &force, grace_period).await;
        tracing::info!("http server stopped");
        result
    }
}

async fn drain(tracker: &ConnectionTracker, force: &ShutdownSignal, grace_period: Duration) {
    let active = tracker.active_connections();
    if active > 0 {
        tracing::info!(
            active,
            grace_period_ms = grace_period.as_millis(),
            "waiting for connections to close"
        );
    }

    if tokio::time::timeout(grace_period, tracker.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            active = tracker.active_connections(),
            "grace period elapsed, dropping remaining connections"
        );
        force.trigger();
        tracker.wait_idle().await;
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    routes: Arc<Routes>,
    shutdown: ShutdownSignal,
    force: ShutdownSignal,
) {
    let service = service_fn(move |req| {
        let routes = Arc::clone(&routes);
        async move { Ok::<_, Infallible>(routes.dispatch(req).await) }
    });
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            tokio::select! {
                result = conn.as_mut() => result,
                () = force.recv() => {
                    tracing::debug!(%remote_addr, "connection dropped");
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = result {
        tracing::debug!(%remote_addr, error = %e, "connection error");
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
