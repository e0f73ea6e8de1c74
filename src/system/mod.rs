//! Node status snapshots for the status endpoint and heartbeats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::NodeIdentity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub version: String,
    pub uptime: i64,
    pub start_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Current status snapshot for this node process.
pub fn snapshot(node: &NodeIdentity, started_at: DateTime<Utc>) -> NodeStatus {
    let now = Utc::now();
    NodeStatus {
        id: node.id.clone(),
        name: node.name.clone(),
        hostname: hostname(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: (now - started_at).num_seconds(),
        start_time: started_at,
        timestamp: now,
    }
}

fn hostname() -> String {
    // /etc/hostname is good enough on the Linux boxes this agent targets;
    // fall back to the environment for anything else.
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_carries_identity_and_uptime() {
        let node = NodeIdentity {
            id: "n-1".into(),
            name: "edge-1".into(),
            key: String::new(),
        };
        let started = Utc::now() - chrono::Duration::seconds(90);

        let status = snapshot(&node, started);
        assert_eq!(status.id, "n-1");
        assert_eq!(status.name, "edge-1");
        assert!(status.uptime >= 90);
        assert!(!status.version.is_empty());
    }
}
