//! TOML configuration for the nodemeter agent.
//!
//! Layered model: compiled-in defaults, overridden by a config file found via
//! the `NODEMETER_CONFIG` environment variable or the standard system
//! location, overridden in turn by CLI flags in `main`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the node agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeIdentity,
    pub panel: PanelConfig,
    pub server: ServerConfig,
    pub speedtest: SpeedTestOptions,
}

impl NodeConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded node configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `NODEMETER_CONFIG` environment variable.
    /// 2. `/etc/nodemeter/nodemeter.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("NODEMETER_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "NODEMETER_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/nodemeter/nodemeter.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

/// Identity of this node as registered with the panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeIdentity {
    pub id: String,
    pub name: String,
    /// Shared credential sent to the panel in the `Node-Key` header.
    pub key: String,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "nodemeter".to_string(),
            key: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Panel / collector
// ---------------------------------------------------------------------------

/// The panel acting as collector for test reports and heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Base URL of the panel. Empty disables reporting and heartbeats.
    pub url: String,
    pub heartbeat_interval_secs: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            heartbeat_interval_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Speed-test engine
// ---------------------------------------------------------------------------

/// Tunables for the measurement engine.
///
/// All sizes use the 2^20-byte megabyte convention; the derived Mbps figures
/// use decimal megabits (bytes * 8 / seconds / 1e6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestOptions {
    /// Deadline applied when a request leaves its timeout at 0.
    pub default_timeout_secs: u64,
    /// Parallel workers for download tests when the request says 0.
    pub download_workers: u32,
    /// Parallel workers for upload tests when the request says 0.
    pub upload_workers: u32,
    /// Size parameter sent to the download target, in MB.
    pub download_size_mb: u32,
    /// Upload payload size, in MB.
    pub upload_payload_mb: u32,
    /// Number of sequential ping probes.
    pub ping_count: u32,
    /// Delay between consecutive ping probes, in milliseconds.
    pub ping_interval_ms: u64,
    /// How long a finished record stays queryable before the sweeper
    /// removes it, in seconds.
    pub retention_secs: u64,
}

impl Default for SpeedTestOptions {
    fn default() -> Self {
        Self {
            default_timeout_secs: 120,
            download_workers: 4,
            upload_workers: 2,
            download_size_mb: 100,
            upload_payload_mb: 10,
            ping_count: 10,
            ping_interval_ms: 100,
            retention_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_engine_contract() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.speedtest.default_timeout_secs, 120);
        assert_eq!(cfg.speedtest.download_workers, 4);
        assert_eq!(cfg.speedtest.upload_workers, 2);
        assert_eq!(cfg.speedtest.ping_count, 10);
        assert_eq!(cfg.speedtest.ping_interval_ms, 100);
        assert_eq!(cfg.speedtest.retention_secs, 300);
        assert_eq!(cfg.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml = r#"
            [node]
            id = "node-7"
            key = "s3cret"

            [speedtest]
            ping_count = 5
        "#;
        let cfg: NodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.node.id, "node-7");
        assert_eq!(cfg.node.key, "s3cret");
        assert_eq!(cfg.speedtest.ping_count, 5);
        // untouched sections keep their defaults
        assert_eq!(cfg.speedtest.download_workers, 4);
        assert_eq!(cfg.panel.heartbeat_interval_secs, 30);
    }

    #[test]
    fn load_reads_a_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"127.0.0.1:9999\"").unwrap();

        let cfg = NodeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9999");
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [[[").unwrap();
        assert!(NodeConfig::load(file.path()).is_err());
    }
}
