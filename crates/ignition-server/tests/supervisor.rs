//! Supervisor behaviour over real sockets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;
use ignition_server::{handlers, text_response, HttpSupervisor, ServerConfig};
use tokio::sync::Notify;

fn supervisor(grace_period: Duration) -> HttpSupervisor {
    HttpSupervisor::new(
        ServerConfig::builder()
            .addr("127.0.0.1:0")
            .grace_period(grace_period)
            .build(),
    )
    .unwrap()
}

/// Registers `/slow`, which signals `entered` and then sleeps for `delay`.
fn slow_route(supervisor: &HttpSupervisor, delay: Duration) -> Arc<Notify> {
    let entered = Arc::new(Notify::new());
    let signal = Arc::clone(&entered);
    supervisor.handle("/slow", move |_req| {
        let signal = Arc::clone(&signal);
        async move {
            signal.notify_one();
            tokio::time::sleep(delay).await;
            text_response(StatusCode::OK, "done")
        }
    });
    entered
}

#[tokio::test]
async fn test_health_then_metrics() {
    let supervisor = supervisor(Duration::from_secs(1));
    supervisor.handle(handlers::HEALTH_PATH, handlers::health);
    supervisor.handle(
        handlers::METRICS_PATH,
        handlers::metrics(Arc::clone(supervisor.metrics())),
    );
    let addr = supervisor.start().await.unwrap();

    let health = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "OK");

    let metrics = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(metrics.status(), 200);
    assert_eq!(
        metrics.headers()["content-type"],
        "text/plain; version=0.0.4"
    );
    let body = metrics.text().await.unwrap();
    let sample = body
        .lines()
        .find(|l| l.starts_with("http_server_requests_total") && l.contains(r#"path="/health""#))
        .expect("health request counted");
    assert!(sample.contains(r#"code="200""#));
    assert!(sample.contains(r#"method="GET""#));
    assert!(sample.ends_with(" 1"), "{sample}");

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_unmatched_path() {
    let supervisor = supervisor(Duration::from_secs(1));
    let addr = supervisor.start().await.unwrap();

    let response = reqwest::get(format!("http://{addr}/missing")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert!(supervisor.metrics().render().contains(r#"path="unmatched""#));

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_route_added_after_start() {
    let supervisor = supervisor(Duration::from_secs(1));
    let addr = supervisor.start().await.unwrap();

    let before = reqwest::get(format!("http://{addr}/late")).await.unwrap();
    assert_eq!(before.status(), 404);

    supervisor.handle("/late", |_req| async {
        text_response(StatusCode::OK, "here")
    });
    let after = reqwest::get(format!("http://{addr}/late")).await.unwrap();
    assert_eq!(after.status(), 200);
    assert_eq!(after.text().await.unwrap(), "here");

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_in_flight_request_completes_within_grace() {
    let supervisor = supervisor(Duration::from_secs(2));
    let entered = slow_route(&supervisor, Duration::from_millis(200));
    let addr = supervisor.start().await.unwrap();

    let request = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
    entered.notified().await;

    supervisor.stop().await.unwrap();

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "done");
}

#[tokio::test]
async fn test_slow_request_dropped_after_grace() {
    let supervisor = supervisor(Duration::from_millis(200));
    let entered = slow_route(&supervisor, Duration::from_secs(10));
    let addr = supervisor.start().await.unwrap();

    let request = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
    entered.notified().await;

    let started = Instant::now();
    supervisor.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    let result = tokio::time::timeout(Duration::from_secs(3), request)
        .await
        .expect("client observes the dropped connection")
        .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_stop_refuses_new_connections() {
    let supervisor = supervisor(Duration::from_millis(100));
    let addr = supervisor.start().await.unwrap();
    supervisor.stop().await.unwrap();

    assert!(reqwest::get(format!("http://{addr}/health")).await.is_err());
}

#[tokio::test]
async fn test_run_returns_after_stop() {
    let supervisor = Arc::new(supervisor(Duration::from_millis(100)));

    let runner = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run().await })
    };
    while supervisor.local_addr().is_none() {
        tokio::task::yield_now().await;
    }
    supervisor.stop().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("run returns")
        .unwrap()
        .unwrap();
}
