//! Request multiplexer.
//!
//! Patterns follow the familiar path-mux rules: a pattern without a trailing
//! slash matches exactly that path, a pattern with a trailing slash matches
//! the whole subtree below it, and the longest matching pattern wins. Routes
//! can be added at any time, including while the server is running.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use parking_lot::RwLock;

/// Response type produced by handlers.
pub type HttpResponse = Response<Full<Bytes>>;

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = HttpResponse> + Send>>;

/// A type-erased request handler.
pub type Handler = Arc<dyn Fn(Request<Incoming>) -> HandlerFuture + Send + Sync>;

/// Builds a plain-text response.
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// A route table shared between the supervisor and its owner.
///
/// Cloning is cheap; clones share the same routes.
#[derive(Clone, Default)]
pub struct ServeMux {
    routes: Arc<RwLock<HashMap<String, Handler>>>,
}

impl ServeMux {
    /// Creates an empty multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `pattern`, replacing any previous handler.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ignition_server::{text_response, ServeMux};
    /// use http::StatusCode;
    ///
    /// let mux = ServeMux::new();
    /// mux.handle("/ping", |_req| async { text_response(StatusCode::OK, "pong") });
    /// assert!(mux.route("/ping").is_some());
    /// ```
    pub fn handle<F, Fut>(&self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |req| Box::pin(handler(req)));
        self.routes.write().insert(pattern.into(), handler);
    }

    /// Finds the handler for `path`, returning the matched pattern with it.
    pub fn route(&self, path: &str) -> Option<(String, Handler)> {
        let routes = self.routes.read();

        if let Some(handler) = routes.get(path) {
            return Some((path.to_string(), Arc::clone(handler)));
        }

        routes
            .iter()
            .filter(|(pattern, _)| pattern.ends_with('/') && path.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(pattern, handler)| (pattern.clone(), Arc::clone(handler)))
    }

    /// Registered patterns, sorted.
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<_> = self.routes.read().keys().cloned().collect();
        patterns.sort();
        patterns
    }
}

impl fmt::Debug for ServeMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeMux")
            .field("patterns", &self.patterns())
            .finish()
    }
}
