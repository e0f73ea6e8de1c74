//! nodemeter -- node agent for distributed network speed measurement.
//!
//! This crate provides the speed-test orchestration engine (concurrent,
//! deadline-bounded throughput and latency measurements), the HTTP surface
//! other nodes measure against, and the reporting plumbing back to a panel.

pub mod api;
pub mod config;
pub mod heartbeat;
pub mod speedtest;
pub mod system;

use std::sync::Arc;

use anyhow::Result;

use crate::config::NodeConfig;
use crate::speedtest::{HttpReporter, NullReporter, Orchestrator, ReportSink, ResultRegistry};

/// Start the nodemeter agent: API server, speed-test engine, heartbeat.
pub async fn serve(config: NodeConfig) -> Result<()> {
    let config = Arc::new(config);
    let started_at = chrono::Utc::now();

    // 1. Speed-test engine with injected collaborators.
    let registry = Arc::new(ResultRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry),
        build_reporter(&config),
        config.speedtest.clone(),
    ));

    // 2. Heartbeat loop (only when a panel is configured).
    if config.panel.url.is_empty() {
        tracing::info!("no panel configured; heartbeats disabled");
    } else {
        let client = orchestrator.http_client();
        let hb_config = (*config).clone();
        tokio::spawn(async move {
            heartbeat::run_heartbeat_loop(client, hb_config, started_at).await;
        });
    }

    // 3. API server.
    let state = api::state::AppState {
        orchestrator,
        config: Arc::clone(&config),
        started_at,
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = config.server.bind.parse()?;
    tracing::info!(%addr, "nodemeter listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_reporter(config: &NodeConfig) -> Arc<dyn ReportSink> {
    if config.panel.url.is_empty() {
        return Arc::new(NullReporter);
    }
    // The reporter gets its own client; it outlives any one test.
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("nodemeter/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client");
    Arc::new(HttpReporter::new(
        client,
        &config.panel.url,
        &config.node.key,
    ))
}
