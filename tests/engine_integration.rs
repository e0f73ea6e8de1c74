//! End-to-end engine tests against in-process target servers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tokio::io::AsyncReadExt;

use nodemeter::api;
use nodemeter::api::state::AppState;
use nodemeter::config::{NodeConfig, SpeedTestOptions};
use nodemeter::speedtest::{
    HttpReporter, NullReporter, Orchestrator, ResultRegistry, TestKind, TestRecord, TestRequest,
    TestStatus,
};

/// Options tuned so tests move data but finish fast.
fn fast_opts() -> SpeedTestOptions {
    SpeedTestOptions {
        default_timeout_secs: 30,
        download_workers: 2,
        upload_workers: 2,
        download_size_mb: 2,
        upload_payload_mb: 1,
        ping_count: 10,
        ping_interval_ms: 10,
        retention_secs: 60,
    }
}

fn orchestrator(opts: SpeedTestOptions) -> Orchestrator {
    Orchestrator::new(
        Arc::new(ResultRegistry::new()),
        Arc::new(NullReporter),
        opts,
    )
}

fn request(kind: TestKind, target: &str) -> TestRequest {
    TestRequest {
        id: String::new(),
        source_node_id: "test-src".into(),
        target_node_id: "test-dst".into(),
        target_url: target.into(),
        kind,
        timeout: 0,
        threads: 0,
    }
}

/// Spawn a full nodemeter instance on an ephemeral port; returns its base URL.
async fn spawn_node() -> String {
    let registry = Arc::new(ResultRegistry::new());
    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(registry, Arc::new(NullReporter), fast_opts())),
        config: Arc::new(NodeConfig::default()),
        started_at: Utc::now(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Spawn a TCP listener that accepts connections and reads forever without
/// ever responding.
async fn spawn_black_hole() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            });
        }
    });
    format!("http://{addr}")
}

async fn wait_terminal(orch: &Orchestrator, id: &str, within: Duration) -> TestRecord {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if let Some(record) = orch.get_result(id).await {
            if record.status.is_terminal() {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "test {id} did not reach a terminal state within {within:?}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn download_completes_against_live_target() {
    let target = spawn_node().await;
    let orch = orchestrator(fast_opts());

    let record = orch
        .start_test(request(TestKind::Download, &target))
        .await
        .unwrap();
    let done = wait_terminal(&orch, &record.id, Duration::from_secs(30)).await;

    assert_eq!(done.status, TestStatus::Completed, "error: {:?}", done.error);
    assert!(done.download_speed > 0.0);
    assert!(done.error.is_none());
    assert!(done.duration > 0);
}

#[tokio::test]
async fn upload_completes_against_live_target() {
    let target = spawn_node().await;
    let orch = orchestrator(fast_opts());

    let record = orch
        .start_test(request(TestKind::Upload, &target))
        .await
        .unwrap();
    let done = wait_terminal(&orch, &record.id, Duration::from_secs(30)).await;

    assert_eq!(done.status, TestStatus::Completed, "error: {:?}", done.error);
    assert!(done.upload_speed > 0.0);
}

#[tokio::test]
async fn ping_against_responsive_target_loses_nothing() {
    let target = spawn_node().await;
    let orch = orchestrator(fast_opts());

    let record = orch
        .start_test(request(TestKind::Ping, &target))
        .await
        .unwrap();
    let done = wait_terminal(&orch, &record.id, Duration::from_secs(30)).await;

    assert_eq!(done.status, TestStatus::Completed, "error: {:?}", done.error);
    assert!(done.ping > 0.0);
    assert!(done.jitter >= 0.0);
    assert_eq!(done.packet_loss, 0.0);
    assert!((0.0..=100.0).contains(&done.packet_loss));
}

#[tokio::test]
async fn unresponsive_target_times_out_near_the_deadline() {
    let target = spawn_black_hole().await;
    let orch = orchestrator(fast_opts());

    let mut req = request(TestKind::Download, &target);
    req.timeout = 1;
    let record = orch.start_test(req).await.unwrap();
    let done = wait_terminal(&orch, &record.id, Duration::from_secs(10)).await;

    assert_eq!(done.status, TestStatus::Timeout);
    assert_eq!(done.error.as_deref(), Some("test timed out"));
    // Finalized when the 1 s deadline fired, give or take scheduling.
    assert!(
        done.duration >= 900 && done.duration <= 3000,
        "duration was {} ms",
        done.duration
    );
    // Speed fields stay at zero on timeout.
    assert_eq!(done.download_speed, 0.0);
}

#[tokio::test]
async fn full_test_keeps_ping_results_when_download_fails() {
    // A target that answers ping probes but serves nothing else, so the
    // download phase aggregates zero bytes and fails the chain.
    let app = Router::new().route("/speedtest/ping", get(|| async { "pong" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let target = format!("http://{addr}");

    let orch = orchestrator(fast_opts());
    let record = orch
        .start_test(request(TestKind::Full, &target))
        .await
        .unwrap();
    let done = wait_terminal(&orch, &record.id, Duration::from_secs(30)).await;

    assert_eq!(done.status, TestStatus::Failed);
    let msg = done.error.expect("failed record carries an error");
    assert!(msg.contains("download"), "error should name the phase: {msg}");
    // The ping phase completed first; its figures survive the failure.
    assert!(done.ping > 0.0);
    assert_eq!(done.packet_loss, 0.0);
    assert_eq!(done.download_speed, 0.0);
    assert_eq!(done.upload_speed, 0.0);
}

#[tokio::test]
async fn finished_record_is_swept_after_retention() {
    let target = spawn_node().await;
    let orch = orchestrator(SpeedTestOptions {
        ping_count: 1,
        retention_secs: 1,
        ..fast_opts()
    });

    let record = orch
        .start_test(request(TestKind::Ping, &target))
        .await
        .unwrap();
    let done = wait_terminal(&orch, &record.id, Duration::from_secs(30)).await;
    assert_eq!(done.status, TestStatus::Completed);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(
        orch.get_result(&record.id).await.is_none(),
        "record should be gone after the retention window"
    );
}

#[tokio::test]
async fn reporter_delivers_finished_record_with_node_key() {
    let target = spawn_node().await;

    // Capture collector: records the Node-Key header and the posted record.
    let captured: Arc<Mutex<Option<(String, TestRecord)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);
    let collector = Router::new().route(
        "/api/node/speedtest/result",
        axum::routing::post(
            move |headers: axum::http::HeaderMap, axum::Json(record): axum::Json<TestRecord>| {
                let sink = Arc::clone(&sink);
                async move {
                    let key = headers
                        .get("Node-Key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *sink.lock().unwrap() = Some((key, record));
                    "ok"
                }
            },
        ),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let collector_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, collector).await.unwrap();
    });

    let client = reqwest::Client::new();
    let orch = Orchestrator::new(
        Arc::new(ResultRegistry::new()),
        Arc::new(HttpReporter::new(client, &collector_url, "k3y")),
        fast_opts(),
    );

    let record = orch
        .start_test(request(TestKind::Ping, &target))
        .await
        .unwrap();
    wait_terminal(&orch, &record.id, Duration::from_secs(30)).await;

    // Delivery is async; give it a moment.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some((key, reported)) = captured.lock().unwrap().clone() {
            assert_eq!(key, "k3y");
            assert_eq!(reported.id, record.id);
            assert_eq!(reported.status, TestStatus::Completed);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "report never reached the collector"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
