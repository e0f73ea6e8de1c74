//! Periodic heartbeat to the panel.
//!
//! Best-effort: a failed beat is logged and the loop moves on. The panel
//! marks a node offline when beats stop arriving; nothing on this side
//! tracks delivery.

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::system;

/// Post a status heartbeat to the panel every configured interval.
/// Runs forever; spawn it.
pub async fn run_heartbeat_loop(client: Client, config: NodeConfig, started_at: DateTime<Utc>) {
    let url = format!(
        "{}/api/node/heartbeat",
        config.panel.url.trim_end_matches('/')
    );
    let mut interval =
        tokio::time::interval(Duration::from_secs(config.panel.heartbeat_interval_secs.max(1)));

    info!(url = %url, interval_secs = config.panel.heartbeat_interval_secs, "heartbeat loop started");

    loop {
        interval.tick().await;

        let status = system::snapshot(&config.node, started_at);
        let result = client
            .post(&url)
            .header("Node-Key", &config.node.key)
            .json(&status)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("heartbeat delivered");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "panel rejected heartbeat");
            }
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
            }
        }
    }
}
