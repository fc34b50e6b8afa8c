//! Built-in handlers.
//!
//! - `/health` answers `200 OK` for as long as the process serves requests.
//! - `/metrics` renders a [`MetricsRegistry`] in Prometheus text format.

use std::future::{ready, Ready};
use std::sync::Arc;

use http::{header, HeaderValue, Request, StatusCode};
use hyper::body::Incoming;
use ignition_telemetry::{MetricsRegistry, PROMETHEUS_CONTENT_TYPE};

use crate::mux::{text_response, HttpResponse};

/// Conventional liveness path.
pub const HEALTH_PATH: &str = "/health";

/// Conventional metrics path.
pub const METRICS_PATH: &str = "/metrics";

/// Liveness handler.
pub fn health(_req: Request<Incoming>) -> Ready<HttpResponse> {
    ready(text_response(StatusCode::OK, "OK"))
}

/// Returns a handler exposing `registry`.
pub fn metrics(
    registry: Arc<MetricsRegistry>,
) -> impl Fn(Request<Incoming>) -> Ready<HttpResponse> + Send + Sync + 'static {
    move |_req| ready(render_metrics(&registry))
}

fn render_metrics(registry: &MetricsRegistry) -> HttpResponse {
    let mut response = text_response(StatusCode::OK, registry.render());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use ignition_telemetry::RequestLabels;
    use std::time::Duration;

    #[tokio::test]
    async fn test_render_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_http_request(
            &RequestLabels {
                method: "GET",
                host: "",
                path: "/x",
                code: 200,
            },
            Duration::ZERO,
        );

        let response = render_metrics(&registry);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(r#"path="/x""#));
    }
}
