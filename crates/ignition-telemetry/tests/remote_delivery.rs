//! End-to-end tests for remote log delivery against a local HTTP endpoint.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use ignition_telemetry::{
    HttpSink, LogServerConfig, LogTransport, LoggerComposer, MemorySink, ReqwestTransport, Sink,
};

struct Captured {
    request_line: String,
    headers: Vec<String>,
    body: String,
}

/// Serves `count` requests answering each with `status`, reporting what it saw.
fn serve(status: &'static str, count: usize) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/logs", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming().take(count) {
            let mut stream = stream.unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut headers = Vec::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                headers.push(line);
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            write!(
                stream,
                "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            )
            .unwrap();

            tx.send(Captured {
                request_line: request_line.trim_end().to_string(),
                headers,
                body: String::from_utf8(body).unwrap(),
            })
            .unwrap();
        }
    });

    (url, rx)
}

fn config(url: &str, user: &str) -> LogServerConfig {
    LogServerConfig {
        url: url.to_string(),
        user: user.to_string(),
        password: "secret".to_string(),
    }
}

#[test]
fn test_transport_posts_json_with_basic_auth() {
    let (url, rx) = serve("201 Created", 1);
    let transport = ReqwestTransport::new(&config(&url, "alice")).unwrap();

    let status = transport.deliver(b"{\"message\":\"hi\"}\n").unwrap();

    assert_eq!(status, 201);
    let captured = rx.recv().unwrap();
    assert_eq!(captured.request_line, "POST /logs HTTP/1.1");
    assert!(captured
        .headers
        .iter()
        .any(|h| h.eq_ignore_ascii_case("content-type: application/json")));
    // base64("alice:secret")
    assert!(captured
        .headers
        .iter()
        .any(|h| h.ends_with("Basic YWxpY2U6c2VjcmV0")));
    assert_eq!(captured.body, "{\"message\":\"hi\"}\n");
}

#[test]
fn test_transport_without_user_sends_no_credentials() {
    let (url, rx) = serve("201 Created", 1);
    let transport = ReqwestTransport::new(&config(&url, "")).unwrap();

    transport.deliver(b"{}").unwrap();

    let captured = rx.recv().unwrap();
    assert!(!captured
        .headers
        .iter()
        .any(|h| h.to_lowercase().starts_with("authorization:")));
}

#[test]
fn test_sink_reports_unexpected_status() {
    let (url, _rx) = serve("200 OK", 1);
    let inner = MemorySink::new();
    let mut sink = HttpSink::wrap(inner.clone(), &config(&url, "")).unwrap();

    let err = sink.write(b"{\"message\":\"x\"}\n").unwrap_err();

    assert!(err.to_string().contains("200"));
    assert_eq!(inner.content(), "{\"message\":\"x\"}\n");
}

#[test]
fn test_unreachable_endpoint_still_writes_inner() {
    // Bind and drop to get a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let inner = MemorySink::new();
    let mut sink =
        HttpSink::wrap(inner.clone(), &config(&format!("http://127.0.0.1:{port}/"), "")).unwrap();

    assert!(sink.write(b"line\n").is_err());
    assert_eq!(inner.content(), "line\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_logger_delivers_each_record_from_async_context() {
    let (url, rx) = serve("201 Created", 2);
    let local = MemorySink::new();
    let remote = HttpSink::wrap(local.clone(), &config(&url, "")).unwrap();
    let logger = LoggerComposer::new()
        .identity("svc", "1.0.0")
        .sink(Sink::json(remote))
        .compose();

    logger.in_scope(|| {
        tracing::info!("first");
        tracing::info!("second");
    });

    let bodies: Vec<serde_json::Value> = rx
        .iter()
        .take(2)
        .map(|c| serde_json::from_str(&c.body).unwrap())
        .collect();
    assert_eq!(bodies[0]["message"], "first");
    assert_eq!(bodies[1]["message"], "second");
    assert_eq!(bodies[1]["app"], "svc");
    assert_eq!(local.records().len(), 2);
}
