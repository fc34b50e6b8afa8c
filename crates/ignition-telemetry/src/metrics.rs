//! Prometheus metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `http_server_requests_total` | Counter | `method`, `host`, `path`, `code`, `app`, `app_v` | Total requests |
//! | `http_server_request_duration_seconds` | Histogram | same | Request latency |
//!
//! `app` and `app_v` are only attached when the registry has an identity.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use metrics::{Counter, Histogram, Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use parking_lot::RwLock;

use crate::{TelemetryError, TelemetryResult};

/// Name of the request counter.
pub const HTTP_REQUESTS_TOTAL: &str = "http_server_requests_total";

/// Name of the request duration histogram.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_server_request_duration_seconds";

/// Content type of the text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

// 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Labels of a single HTTP request observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabels<'a> {
    /// Request method.
    pub method: &'a str,
    /// Host header, empty when absent.
    pub host: &'a str,
    /// Matched route pattern.
    pub path: &'a str,
    /// Response status code.
    pub code: u16,
}

/// A metrics registry rendering the Prometheus text format.
///
/// Each registry owns its recorder, so independent registries never share
/// samples. Handles are cached by metric name and label set; lookups take a
/// read lock and only the first registration of a key takes the write lock.
pub struct MetricsRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    base_labels: Vec<(String, String)>,
    counters: RwLock<HashMap<String, Counter>>,
    histograms: RwLock<HashMap<String, Histogram>>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> TelemetryResult<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();

        Ok(Self {
            recorder,
            handle,
            base_labels: Vec::new(),
            counters: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        })
    }

    /// Attaches `app` and `app_v` labels to every metric. Empty values are
    /// skipped.
    #[must_use]
    pub fn with_identity(mut self, name: &str, version: &str) -> Self {
        self.base_labels.retain(|(k, _)| k != "app" && k != "app_v");
        if !name.is_empty() {
            self.base_labels.push(("app".to_string(), name.to_string()));
        }
        if !version.is_empty() {
            self.base_labels
                .push(("app_v".to_string(), version.to_string()));
        }
        self
    }

    /// Returns the counter for `name` and `labels`, registering it on first use.
    pub fn counter(&self, name: &str, help: &str, labels: &[(&str, String)]) -> Counter {
        let (key, cache_key) = self.key(name, labels);

        if let Some(counter) = self.counters.read().get(&cache_key) {
            return counter.clone();
        }

        let mut counters = self.counters.write();
        counters
            .entry(cache_key)
            .or_insert_with(|| {
                self.recorder
                    .describe_counter(name.to_string().into(), None, help.to_string().into());
                self.recorder.register_counter(&key, &metadata())
            })
            .clone()
    }

    /// Returns the histogram for `name` and `labels`, registering it on first use.
    pub fn histogram(&self, name: &str, help: &str, labels: &[(&str, String)]) -> Histogram {
        let (key, cache_key) = self.key(name, labels);

        if let Some(histogram) = self.histograms.read().get(&cache_key) {
            return histogram.clone();
        }

        let mut histograms = self.histograms.write();
        histograms
            .entry(cache_key)
            .or_insert_with(|| {
                self.recorder
                    .describe_histogram(name.to_string().into(), None, help.to_string().into());
                self.recorder.register_histogram(&key, &metadata())
            })
            .clone()
    }

    /// Records a served HTTP request.
    pub fn record_http_request(&self, labels: &RequestLabels<'_>, duration: Duration) {
        let labels = [
            ("method", labels.method.to_string()),
            ("host", labels.host.to_string()),
            ("path", labels.path.to_string()),
            ("code", labels.code.to_string()),
        ];

        self.counter(
            HTTP_REQUESTS_TOTAL,
            "Total number of HTTP server requests",
            &labels,
        )
        .increment(1);
        self.histogram(
            HTTP_REQUEST_DURATION_SECONDS,
            "HTTP server request duration",
            &labels,
        )
        .record(duration.as_secs_f64());
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn key(&self, name: &str, labels: &[(&str, String)]) -> (Key, String) {
        let mut all: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .chain(self.base_labels.iter().cloned())
            .collect();
        all.sort();
        all.dedup_by(|a, b| a.0 == b.0);

        let cache_key = all.iter().fold(name.to_string(), |mut acc, (k, v)| {
            acc.push('\u{1f}');
            acc.push_str(k);
            acc.push('=');
            acc.push_str(v);
            acc
        });
        let key = Key::from_parts(
            name.to_string(),
            all.into_iter()
                .map(|(k, v)| Label::new(k, v))
                .collect::<Vec<_>>(),
        );
        (key, cache_key)
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("base_labels", &self.base_labels)
            .field("counters", &self.counters.read().len())
            .field("histograms", &self.histograms.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, code: u16) -> RequestLabels<'_> {
        RequestLabels {
            method: "GET",
            host: "localhost",
            path,
            code,
        }
    }

    #[test]
    fn test_render_request_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_http_request(&request("/health", 200), Duration::from_millis(3));

        let output = registry.render();
        assert!(output.contains(HTTP_REQUESTS_TOTAL));
        assert!(output.contains(HTTP_REQUEST_DURATION_SECONDS));
        assert!(output.contains(r#"path="/health""#));
        assert!(output.contains(r#"code="200""#));
        assert!(output.contains(r#"method="GET""#));
        assert!(output.contains(r#"host="localhost""#));
        assert!(!output.contains("app="));
    }

    #[test]
    fn test_counter_accumulates_per_label_set() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_http_request(&request("/a", 200), Duration::ZERO);
        registry.record_http_request(&request("/a", 200), Duration::ZERO);
        registry.record_http_request(&request("/b", 404), Duration::ZERO);

        let output = registry.render();
        let line_a = output
            .lines()
            .find(|l| l.starts_with(HTTP_REQUESTS_TOTAL) && l.contains(r#"path="/a""#))
            .unwrap();
        assert!(line_a.ends_with(" 2"));
        let line_b = output
            .lines()
            .find(|l| l.starts_with(HTTP_REQUESTS_TOTAL) && l.contains(r#"path="/b""#))
            .unwrap();
        assert!(line_b.ends_with(" 1"));
    }

    #[test]
    fn test_identity_labels() {
        let registry = MetricsRegistry::new().unwrap().with_identity("svc", "1.2.3");
        registry.record_http_request(&request("/", 200), Duration::ZERO);

        let output = registry.render();
        assert!(output.contains(r#"app="svc""#));
        assert!(output.contains(r#"app_v="1.2.3""#));

        let registry = MetricsRegistry::new().unwrap().with_identity("svc", "");
        registry.record_http_request(&request("/", 200), Duration::ZERO);
        assert!(!registry.render().contains("app_v="));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = MetricsRegistry::new().unwrap();
        let second = MetricsRegistry::new().unwrap();
        first.record_http_request(&request("/only-first", 200), Duration::ZERO);

        assert!(first.render().contains("/only-first"));
        assert!(!second.render().contains("/only-first"));
    }

    #[test]
    fn test_cache_key_ignores_label_order() {
        let registry = MetricsRegistry::new().unwrap();
        let a = registry.counter("jobs_total", "Jobs", &[("a", "1".into()), ("b", "2".into())]);
        let b = registry.counter("jobs_total", "Jobs", &[("b", "2".into()), ("a", "1".into())]);
        a.increment(1);
        b.increment(1);

        assert_eq!(registry.counters.read().len(), 1);
        assert!(registry
            .render()
            .lines()
            .any(|l| l.starts_with("jobs_total") && l.ends_with(" 2")));
    }

    #[test]
    fn test_histogram_buckets() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_http_request(&request("/slow", 200), Duration::from_millis(300));

        let output = registry.render();
        assert!(output.contains(&format!("{HTTP_REQUEST_DURATION_SECONDS}_bucket")));
        assert!(output.contains(r#"le="0.5""#));
    }
}
