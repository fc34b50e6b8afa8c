//! Remote HTTP log delivery.
//!
//! [`HttpSink`] is a write-through writer: each buffer goes to the inner
//! writer first and is then POSTed to a log server. Only `201 Created` counts
//! as delivered; any other outcome is returned to the caller of `write`
//! after the inner write has already happened.

use std::fmt;
use std::io::{self, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ignition_config::Environment;
use reqwest::{StatusCode, Url};

use crate::TelemetryError;

/// Timeout applied to each delivery request.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends one serialized record to a remote endpoint.
pub trait LogTransport: Send + Sync {
    /// Delivers `body` and returns the response status code.
    fn deliver(&self, body: &[u8]) -> Result<u16, TelemetryError>;
}

/// Remote log server settings.
#[derive(Clone, PartialEq, Eq)]
pub struct LogServerConfig {
    /// Endpoint receiving `POST` requests.
    pub url: String,
    /// Basic-auth user; no credentials are sent when empty.
    pub user: String,
    /// Basic-auth password.
    pub password: String,
}

impl LogServerConfig {
    /// Reads `<PREFIX>_LOGSERVER_URL`, `_USER` and `_PASSWORD`.
    ///
    /// Prefixes are checked in order and a later prefix with a URL wins.
    /// Returns `None` when no prefix defines a URL.
    pub fn from_env(env: &Environment, prefixes: &[String]) -> Option<Self> {
        prefixes
            .iter()
            .filter_map(|prefix| {
                let url = env.get(&format!("{prefix}_LOGSERVER_URL"))?;
                Some(Self {
                    url: url.to_string(),
                    user: env
                        .get(&format!("{prefix}_LOGSERVER_USER"))
                        .unwrap_or_default()
                        .to_string(),
                    password: env
                        .get(&format!("{prefix}_LOGSERVER_PASSWORD"))
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .last()
    }
}

impl fmt::Debug for LogServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogServerConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

struct Delivery {
    body: Vec<u8>,
    reply: mpsc::SyncSender<Result<u16, TelemetryError>>,
}

/// [`LogTransport`] backed by `reqwest`.
///
/// Requests are executed on a dedicated thread with its own single-threaded
/// runtime, so `deliver` can be called from synchronous code as well as from
/// inside any tokio runtime. The thread exits when the transport is dropped.
pub struct ReqwestTransport {
    url: Url,
    queue: mpsc::Sender<Delivery>,
}

impl ReqwestTransport {
    /// Creates a transport for `config`.
    pub fn new(config: &LogServerConfig) -> Result<Self, TelemetryError> {
        if config.url.is_empty() {
            return Err(TelemetryError::InvalidUrl("empty url".to_string()));
        }
        let url = Url::parse(&config.url)
            .map_err(|e| TelemetryError::InvalidUrl(format!("{}: {e}", config.url)))?;

        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (queue, rx) = mpsc::channel::<Delivery>();
        let target = url.clone();
        let user = config.user.clone();
        let password = config.password.clone();

        thread::Builder::new()
            .name("log-delivery".to_string())
            .spawn(move || {
                // Client internals must not log back into the sink that is
                // waiting on this thread.
                let _guard = tracing::dispatcher::set_default(&tracing::Dispatch::none());
                while let Ok(delivery) = rx.recv() {
                    let mut request = client
                        .post(target.clone())
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body(delivery.body);
                    if !user.is_empty() {
                        request = request.basic_auth(&user, Some(&password));
                    }
                    let result = runtime
                        .block_on(request.send())
                        .map(|response| response.status().as_u16())
                        .map_err(|e| TelemetryError::Transport(e.to_string()));
                    let _ = delivery.reply.send(result);
                }
            })?;

        Ok(Self { url, queue })
    }

    /// The endpoint records are sent to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl LogTransport for ReqwestTransport {
    fn deliver(&self, body: &[u8]) -> Result<u16, TelemetryError> {
        let (reply, response) = mpsc::sync_channel(1);
        self.queue
            .send(Delivery {
                body: body.to_vec(),
                reply,
            })
            .map_err(|_| TelemetryError::Transport("delivery thread stopped".to_string()))?;
        response
            .recv()
            .map_err(|_| TelemetryError::Transport("delivery thread stopped".to_string()))?
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// Write-through writer posting every buffer to a log server.
pub struct HttpSink<W = io::Sink> {
    inner: W,
    transport: Box<dyn LogTransport>,
}

impl HttpSink<io::Sink> {
    /// Creates a sink that only delivers remotely.
    pub fn new(config: &LogServerConfig) -> Result<Self, TelemetryError> {
        Ok(Self::with_transport(io::sink(), ReqwestTransport::new(config)?))
    }
}

impl<W: Write> HttpSink<W> {
    /// Creates a sink writing to `inner` before delivering remotely.
    pub fn wrap(inner: W, config: &LogServerConfig) -> Result<Self, TelemetryError> {
        Ok(Self::with_transport(inner, ReqwestTransport::new(config)?))
    }

    /// Creates a sink with a custom transport.
    pub fn with_transport(inner: W, transport: impl LogTransport + 'static) -> Self {
        Self {
            inner,
            transport: Box::new(transport),
        }
    }

    /// Returns the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for HttpSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_all(buf)?;

        let status = self.transport.deliver(buf).map_err(TelemetryError::into_io)?;
        if status != StatusCode::CREATED.as_u16() {
            return Err(TelemetryError::RemoteStatus { status }.into_io());
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W> fmt::Debug for HttpSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct MockTransport {
        status: u16,
        bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl LogTransport for MockTransport {
        fn deliver(&self, body: &[u8]) -> Result<u16, TelemetryError> {
            self.bodies.lock().push(body.to_vec());
            Ok(self.status)
        }
    }

    struct Unreachable;

    impl LogTransport for Unreachable {
        fn deliver(&self, _body: &[u8]) -> Result<u16, TelemetryError> {
            Err(TelemetryError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn test_created_is_success() {
        let transport = MockTransport {
            status: 201,
            ..Default::default()
        };
        let inner = MemorySink::new();
        let mut sink = HttpSink::with_transport(inner.clone(), transport.clone());

        let n = sink.write(b"{\"message\":\"hi\"}\n").unwrap();

        assert_eq!(n, 17);
        assert_eq!(inner.content(), "{\"message\":\"hi\"}\n");
        assert_eq!(transport.bodies.lock().as_slice(), [b"{\"message\":\"hi\"}\n".to_vec()]);
    }

    #[test]
    fn test_non_created_status_fails_after_inner_write() {
        for status in [200, 204, 400, 500] {
            let inner = MemorySink::new();
            let transport = MockTransport {
                status,
                ..Default::default()
            };
            let mut sink = HttpSink::with_transport(inner.clone(), transport);

            let err = sink.write(b"line\n").unwrap_err();

            assert!(err.to_string().contains(&status.to_string()));
            assert_eq!(inner.content(), "line\n");
        }
    }

    #[test]
    fn test_transport_error_after_inner_write() {
        let inner = MemorySink::new();
        let mut sink = HttpSink::with_transport(inner.clone(), Unreachable);

        let err = sink.write(b"line\n").unwrap_err();

        assert!(err.to_string().contains("connection refused"));
        assert_eq!(inner.content(), "line\n");
    }

    #[test]
    fn test_invalid_url() {
        let config = LogServerConfig {
            url: String::new(),
            user: String::new(),
            password: String::new(),
        };
        assert!(matches!(
            ReqwestTransport::new(&config),
            Err(TelemetryError::InvalidUrl(_))
        ));

        let config = LogServerConfig {
            url: "not a url".to_string(),
            ..config
        };
        assert!(matches!(
            HttpSink::new(&config),
            Err(TelemetryError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_config_from_env() {
        let prefixes = vec!["APP".to_string(), "SVC".to_string()];

        assert!(LogServerConfig::from_env(&Environment::default(), &prefixes).is_none());

        let env = Environment::from_pairs([
            ("APP_LOGSERVER_URL", "http://a/logs"),
            ("SVC_LOGSERVER_URL", "http://b/logs"),
            ("SVC_LOGSERVER_USER", "bob"),
            ("SVC_LOGSERVER_PASSWORD", "pw"),
        ]);
        let config = LogServerConfig::from_env(&env, &prefixes).unwrap();
        assert_eq!(config.url, "http://b/logs");
        assert_eq!(config.user, "bob");
        assert_eq!(config.password, "pw");
        assert!(!format!("{config:?}").contains("pw"));

        let env = Environment::from_pairs([("APP_LOGSERVER_URL", "http://a/logs")]);
        let config = LogServerConfig::from_env(&env, &prefixes).unwrap();
        assert_eq!(config.url, "http://a/logs");
        assert!(config.user.is_empty());
    }
}
