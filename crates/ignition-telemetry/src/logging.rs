//! Multi-sink structured logging.
//!
//! Every crate logs through the `tracing` macros. A [`Logger`] is a
//! `tracing::Dispatch` with one `tracing_subscriber::fmt` layer per
//! [`Sink`], JSON or compact text, each stamping the application identity
//! onto the line it writes.
//!
//! # Example
//!
//! ```
//! use ignition_telemetry::{LoggerComposer, MemorySink};
//!
//! let buffer = MemorySink::new();
//! let logger = LoggerComposer::new()
//!     .identity("billing-api", "1.4.0")
//!     .memory(&buffer)
//!     .compose();
//!
//! logger.in_scope(|| tracing::info!(order_id = 7, "order accepted"));
//!
//! let records = buffer.records();
//! assert_eq!(records[0]["message"], "order accepted");
//! assert_eq!(records[0]["app"], "billing-api");
//! assert_eq!(records[0]["order_id"], 7);
//! ```

use std::fmt;
use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use ignition_config::Environment;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, JsonFields, Writer};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Registry;

/// RFC 3339 UTC with millisecond precision.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// The subscriber every sink layer is stacked on.
type Base = Layered<LevelFilter, Registry>;

type SinkLayer = Box<dyn Layer<Base> + Send + Sync>;

/// How a sink renders records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable single line.
    Pretty,
}

/// A single log record destination.
pub struct Sink {
    format: SinkFormat,
    color: bool,
    writer: BoxMakeWriter,
}

impl Sink {
    /// Creates a sink writing `format` records to `writer`.
    pub fn new(writer: impl Write + Send + 'static, format: SinkFormat) -> Self {
        Self {
            format,
            color: false,
            writer: BoxMakeWriter::new(std::sync::Mutex::new(writer)),
        }
    }

    /// Creates a JSON sink.
    pub fn json(writer: impl Write + Send + 'static) -> Self {
        Self::new(writer, SinkFormat::Json)
    }

    /// Creates a human-readable sink.
    pub fn pretty(writer: impl Write + Send + 'static) -> Self {
        Self::new(writer, SinkFormat::Pretty)
    }

    /// Creates the console sink on stderr.
    ///
    /// Pretty and coloured on an interactive terminal, raw JSON otherwise.
    pub fn console() -> Self {
        if io::stderr().is_terminal() {
            Self::pretty(io::stderr()).with_color(true)
        } else {
            Self::json(io::stderr())
        }
    }

    /// Enables ANSI colours for pretty output.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Returns the sink's format.
    pub fn format(&self) -> SinkFormat {
        self.format
    }

    fn into_layer(self, identity: Option<Arc<Identity>>) -> SinkLayer {
        let timer = ChronoUtc::new(TIME_FORMAT.to_string());
        match self.format {
            SinkFormat::Json => {
                let inner = tracing_subscriber::fmt::format()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_timer(timer);
                tracing_subscriber::fmt::layer()
                    .fmt_fields(JsonFields::new())
                    .event_format(Stamped {
                        inner,
                        identity,
                        format: SinkFormat::Json,
                    })
                    .with_ansi(false)
                    .with_writer(self.writer)
                    .boxed()
            }
            SinkFormat::Pretty => {
                let inner = tracing_subscriber::fmt::format()
                    .compact()
                    .with_ansi(self.color)
                    .with_timer(timer);
                tracing_subscriber::fmt::layer()
                    .event_format(Stamped {
                        inner,
                        identity,
                        format: SinkFormat::Pretty,
                    })
                    .with_ansi(self.color)
                    .with_writer(self.writer)
                    .boxed()
            }
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("format", &self.format)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct Identity {
    name: String,
    version: String,
}

/// Appends `app` and `app_v` to whatever `inner` renders.
struct Stamped<E> {
    inner: E,
    identity: Option<Arc<Identity>>,
    format: SinkFormat,
}

impl<S, N, E> FormatEvent<S, N> for Stamped<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let Some(identity) = &self.identity else {
            return self.inner.format_event(ctx, writer, event);
        };

        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;
        let line = line.trim_end();

        match self.format {
            SinkFormat::Json => {
                let mut record: Map<String, Value> =
                    serde_json::from_str(line).map_err(|_| fmt::Error)?;
                record.insert("app".to_string(), Value::from(identity.name.as_str()));
                record.insert("app_v".to_string(), Value::from(identity.version.as_str()));
                writeln!(writer, "{}", Value::Object(record))
            }
            SinkFormat::Pretty => writeln!(
                writer,
                "{line} app={} app_v={}",
                identity.name, identity.version
            ),
        }
    }
}

/// Returns `true` when `<PREFIX>_DEBUG` is `"true"` or `"1"` for any prefix.
pub fn debug_enabled(env: &Environment, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|prefix| env.flag(&format!("{prefix}_DEBUG")))
}

/// Builds a [`Logger`] from a set of sinks.
#[derive(Debug)]
pub struct LoggerComposer {
    identity: Option<Identity>,
    level: LevelFilter,
    sinks: Vec<Sink>,
}

impl Default for LoggerComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerComposer {
    /// Creates a composer with no sinks at the INFO level.
    pub fn new() -> Self {
        Self {
            identity: None,
            level: LevelFilter::INFO,
            sinks: Vec::new(),
        }
    }

    /// Stamps every record with `app` and `app_v`.
    #[must_use]
    pub fn identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.identity = Some(Identity {
            name: name.into(),
            version: version.into(),
        });
        self
    }

    /// Sets the maximum level.
    #[must_use]
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Switches between the DEBUG and INFO levels.
    #[must_use]
    pub fn debug(self, debug: bool) -> Self {
        self.level(if debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
    }

    /// Appends a sink.
    #[must_use]
    pub fn sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Appends the console sink.
    #[must_use]
    pub fn console(self) -> Self {
        self.sink(Sink::console())
    }

    /// Appends a JSON sink writing into `buffer`.
    #[must_use]
    pub fn memory(self, buffer: &MemorySink) -> Self {
        self.sink(Sink::json(buffer.clone()))
    }

    /// Number of sinks added so far.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Builds the logger.
    pub fn compose(self) -> Logger {
        let identity = self.identity.map(Arc::new);
        let layers: Vec<SinkLayer> = self
            .sinks
            .into_iter()
            .map(|sink| sink.into_layer(identity.clone()))
            .collect();
        let subscriber = tracing_subscriber::registry().with(self.level).with(layers);
        Logger {
            dispatch: Dispatch::new(subscriber),
            level: self.level,
        }
    }
}

/// A composed logger.
///
/// Cloning is cheap; clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    level: LevelFilter,
}

impl Logger {
    /// A logger that discards everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            level: LevelFilter::OFF,
        }
    }

    /// Returns the underlying dispatcher.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Returns the maximum level.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Runs `f` with this logger as the current default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Attaches this logger to a future.
    pub fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }

    /// Installs this logger as the process-wide default.
    ///
    /// Returns `false` if a global default was already set.
    pub fn try_install_global(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// An in-memory sink, mostly useful in tests.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn content(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Written lines, without terminators.
    pub fn lines(&self) -> Vec<String> {
        self.content().lines().map(str::to_string).collect()
    }

    /// Written lines parsed as JSON. Lines that are not JSON are skipped.
    pub fn records(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Discards the buffer content.
    pub fn clear(&self) {
        self.buf.lock().clear();
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
