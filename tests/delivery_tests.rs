use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use logfan::config::{DistributorConfig, SinkConfig};
use logfan::web::Distributor;
use serde_json::json;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::time::sleep;

/// Scripted behavior for a mock sink: the first `fail_first` requests get
/// `status`, everything after gets `200 OK`.
struct SinkBehavior {
    fail_first: usize,
    status: StatusCode,
    delay: Duration,
    healthy: bool,
}

impl Default for SinkBehavior {
    fn default() -> Self {
        Self {
            fail_first: 0,
            status: StatusCode::OK,
            delay: Duration::ZERO,
            healthy: true,
        }
    }
}

#[derive(Clone)]
struct SinkState {
    hits: Arc<AtomicUsize>,
    fail_first: usize,
    status: StatusCode,
    delay: Duration,
    healthy: bool,
    in_flight: Arc<AtomicI64>,
    max_in_flight: Arc<AtomicI64>,
}

struct MockSink {
    endpoint: String,
    hits: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicI64>,
}

impl MockSink {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn analyze_handler(State(state): State<SinkState>) -> StatusCode {
    let n = state.hits.fetch_add(1, Ordering::SeqCst);
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);

    if !state.delay.is_zero() {
        sleep(state.delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    if n < state.fail_first {
        state.status
    } else {
        StatusCode::OK
    }
}

async fn health_handler(State(state): State<SinkState>) -> StatusCode {
    if state.healthy {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn spawn_sink(behavior: SinkBehavior) -> MockSink {
    let state = SinkState {
        hits: Arc::new(AtomicUsize::new(0)),
        fail_first: behavior.fail_first,
        status: behavior.status,
        delay: behavior.delay,
        healthy: behavior.healthy,
        in_flight: Arc::new(AtomicI64::new(0)),
        max_in_flight: Arc::new(AtomicI64::new(0)),
    };
    let hits = Arc::clone(&state.hits);
    let max_in_flight = Arc::clone(&state.max_in_flight);

    let app = Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockSink {
        endpoint: format!("http://{}/analyze", addr),
        hits,
        max_in_flight,
    }
}

/// An endpoint with nothing listening behind it: connections are refused.
async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/analyze", addr)
}

fn sink_config(id: &str, weight: f64, endpoint: &str, retry_count: u32) -> SinkConfig {
    SinkConfig {
        id: id.to_string(),
        weight,
        enabled: true,
        endpoint: endpoint.to_string(),
        timeout: 500,
        retry_count,
    }
}

async fn start_distributor(
    analyzers: Vec<SinkConfig>,
    max_concurrency: usize,
    probe_health: bool,
) -> String {
    let total_weight = analyzers.iter().map(|s| s.weight).sum();
    let config = DistributorConfig {
        port: 0,
        max_concurrency,
        probe_health,
        analyzers,
        total_weight,
    };

    let distributor = Distributor::new(config).unwrap();
    distributor.spawn_queue_worker();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = distributor.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

fn packet(message_ids: &[String]) -> serde_json::Value {
    let now = Utc::now().to_rfc3339();
    json!({
        "packet_id": "packet-1",
        "agent_id": "agent-1",
        "timestamp": now,
        "messages": message_ids.iter().map(|id| json!({
            "id": id,
            "timestamp": now,
            "level": "ERROR",
            "source": "test-service",
            "message": "boom",
            "metadata": { "host": "test-host" }
        })).collect::<Vec<_>>()
    })
}

async fn post_messages(base: &str, ids: &[&str]) {
    let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/logs", base))
        .json(&packet(&ids))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

async fn queue_size(base: &str) -> u64 {
    let body: serde_json::Value = reqwest::get(format!("{}/queue", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["queue_size"].as_u64().unwrap()
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_delivers_message_to_sink() {
    let sink = spawn_sink(SinkBehavior::default()).await;
    let base = start_distributor(vec![sink_config("a", 1.0, &sink.endpoint, 3)], 10, false).await;

    post_messages(&base, &["m1"]).await;

    assert!(wait_until(Duration::from_secs(5), || sink.hits() == 1).await);
    assert_eq!(queue_size(&base).await, 0);
}

#[tokio::test]
async fn test_client_error_is_terminal() {
    let sink = spawn_sink(SinkBehavior {
        fail_first: usize::MAX,
        status: StatusCode::UNPROCESSABLE_ENTITY,
        ..Default::default()
    })
    .await;
    let base = start_distributor(vec![sink_config("a", 1.0, &sink.endpoint, 3)], 10, false).await;

    post_messages(&base, &["m1"]).await;

    // A retry would land at ~1 s, a queue pass at ~2 s; neither may happen.
    sleep(Duration::from_millis(2600)).await;
    assert_eq!(sink.hits(), 1);
    assert_eq!(queue_size(&base).await, 0);
}

#[tokio::test]
async fn test_rate_limited_sink_is_retried_with_backoff() {
    let sink = spawn_sink(SinkBehavior {
        fail_first: 2,
        status: StatusCode::TOO_MANY_REQUESTS,
        ..Default::default()
    })
    .await;
    let base = start_distributor(vec![sink_config("a", 1.0, &sink.endpoint, 3)], 10, false).await;

    let started = Instant::now();
    post_messages(&base, &["m1"]).await;

    // Attempts at ~0 s, ~1 s and ~3 s; the third succeeds.
    assert!(wait_until(Duration::from_secs(8), || sink.hits() == 3).await);
    assert!(
        started.elapsed() >= Duration::from_millis(2900),
        "backoff was shorter than 1s + 2s"
    );

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(sink.hits(), 3, "no attempts expected after success");
    assert_eq!(queue_size(&base).await, 0);
}

#[tokio::test]
async fn test_exhausted_message_reroutes_to_untried_sink() {
    let dead = dead_endpoint().await;
    let backup = spawn_sink(SinkBehavior::default()).await;

    // All the weight on the dead sink: the first attempt always goes there.
    let base = start_distributor(
        vec![
            sink_config("primary", 1.0, &dead, 0),
            sink_config("backup", 0.0, &backup.endpoint, 0),
        ],
        10,
        false,
    )
    .await;

    post_messages(&base, &["m1"]).await;

    // The queue pass runs every 2 s and must pick the untried backup.
    assert!(wait_until(Duration::from_secs(6), || backup.hits() == 1).await);
    assert_eq!(queue_size(&base).await, 0);
}

#[tokio::test]
async fn test_fully_unreachable_sinks_stay_queued() {
    let dead_a = dead_endpoint().await;
    let dead_b = dead_endpoint().await;

    let base = start_distributor(
        vec![
            sink_config("a", 1.0, &dead_a, 0),
            sink_config("b", 1.0, &dead_b, 0),
        ],
        10,
        false,
    )
    .await;

    post_messages(&base, &["m1", "m2"]).await;

    sleep(Duration::from_millis(3500)).await;
    assert_eq!(queue_size(&base).await, 2);

    let body: serde_json::Value = reqwest::get(format!("{}/queue", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_ne!(body["oldest_message_age"], "");

    // Both sinks are in every tried set now; nothing leaves the queue.
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(queue_size(&base).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_weighted_split_tracks_configured_weights() {
    let heavy = spawn_sink(SinkBehavior::default()).await;
    let light = spawn_sink(SinkBehavior::default()).await;

    let base = start_distributor(
        vec![
            sink_config("heavy", 3.0, &heavy.endpoint, 0),
            sink_config("light", 1.0, &light.endpoint, 0),
        ],
        10,
        false,
    )
    .await;

    let total = 400usize;
    let ids: Vec<String> = (0..total).map(|i| format!("m{}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    post_messages(&base, &id_refs).await;

    assert!(wait_until(Duration::from_secs(20), || heavy.hits() + light.hits() == total).await);
    assert_eq!(queue_size(&base).await, 0);

    let heavy_share = heavy.hits() as f64 / total as f64;
    assert!(
        (0.6..=0.9).contains(&heavy_share),
        "heavy sink got {:.0}% of traffic, expected ~75%",
        heavy_share * 100.0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_bounds_in_flight_dispatches() {
    let sink = spawn_sink(SinkBehavior {
        delay: Duration::from_millis(300),
        ..Default::default()
    })
    .await;

    let base = start_distributor(vec![sink_config("a", 1.0, &sink.endpoint, 0)], 2, false).await;

    let started = Instant::now();
    post_messages(&base, &["m1", "m2", "m3", "m4", "m5", "m6"]).await;

    assert!(wait_until(Duration::from_secs(10), || sink.hits() == 6).await);
    assert!(
        sink.max_in_flight.load(Ordering::SeqCst) <= 2,
        "more than 2 dispatches in flight"
    );
    // Six 300 ms deliveries through two slots take at least three waves.
    assert!(started.elapsed() >= Duration::from_millis(800));
}

#[tokio::test]
async fn test_health_probe_filters_failing_sink() {
    // Rejects everything it receives and reports unhealthy.
    let broken = spawn_sink(SinkBehavior {
        fail_first: usize::MAX,
        status: StatusCode::UNPROCESSABLE_ENTITY,
        healthy: false,
        ..Default::default()
    })
    .await;
    let good = spawn_sink(SinkBehavior::default()).await;

    // Without probing, virtually every message would pick the broken sink
    // and terminate on its 422.
    let base = start_distributor(
        vec![
            sink_config("broken", 100.0, &broken.endpoint, 0),
            sink_config("good", 1.0, &good.endpoint, 0),
        ],
        10,
        true,
    )
    .await;

    post_messages(&base, &["m1", "m2", "m3"]).await;

    assert!(wait_until(Duration::from_secs(5), || good.hits() == 3).await);
    assert_eq!(broken.hits(), 0);
    assert_eq!(queue_size(&base).await, 0);
}
