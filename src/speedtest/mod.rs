//! Speed-test orchestration engine.
//!
//! Runs concurrent, time-bounded throughput and latency measurements against
//! a target node, tracks each test through a small state machine
//! (`pending -> running -> {completed | failed | timeout}`), and reports
//! finished records to a collector.

pub mod orchestrator;
pub mod registry;
pub mod reporter;
pub mod strategy;
pub mod sweeper;

pub use orchestrator::Orchestrator;
pub use registry::ResultRegistry;
pub use reporter::{HttpReporter, NullReporter, ReportSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Kinds and statuses
// ---------------------------------------------------------------------------

/// Kind of measurement to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Download,
    Upload,
    Ping,
    /// Composite: ping, then download, then upload.
    Full,
}

impl std::str::FromStr for TestKind {
    type Err = StartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(TestKind::Download),
            "upload" => Ok(TestKind::Upload),
            "ping" => Ok(TestKind::Ping),
            "full" => Ok(TestKind::Full),
            other => Err(StartError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestKind::Download => write!(f, "download"),
            TestKind::Upload => write!(f, "upload"),
            TestKind::Ping => write!(f, "ping"),
            TestKind::Full => write!(f, "full"),
        }
    }
}

/// Lifecycle state of a test record.
///
/// Transitions are one-directional: `Pending -> Running` at creation, then
/// exactly one of the terminal states at finalization. A terminal record is
/// never mutated again, only removed by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::Completed | TestStatus::Failed | TestStatus::Timeout
        )
    }
}

// ---------------------------------------------------------------------------
// Request and record
// ---------------------------------------------------------------------------

/// A request to start a measurement.
///
/// `target_url` is the base URL of a peer node exposing the standard target
/// endpoints (`/speedtest/download`, `/speedtest/upload`, `/speedtest/ping`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRequest {
    /// Caller-assigned test id; a UUID is generated when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source_node_id: String,
    #[serde(default)]
    pub target_node_id: String,
    #[serde(default)]
    pub target_url: String,
    #[serde(rename = "type")]
    pub kind: TestKind,
    /// Timeout in seconds; 0 means the configured default (120 s).
    #[serde(default)]
    pub timeout: u64,
    /// Parallel worker count; 0 means the kind-specific default.
    #[serde(default)]
    pub threads: u32,
}

/// The central entity tracked by the engine.
///
/// Exactly one supervising task owns a record between creation and
/// finalization; the registry only ever stores snapshots, so readers never
/// observe a half-mutated record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub kind: TestKind,
    pub status: TestStatus,
    /// Download speed in Mbps. Meaningful only when status is `Completed`
    /// (or populated by a completed phase of a `Full` test).
    pub download_speed: f64,
    /// Upload speed in Mbps.
    pub upload_speed: f64,
    /// Mean round-trip latency in milliseconds.
    pub ping: f64,
    /// Mean absolute difference between consecutive latency samples, ms.
    pub jitter: f64,
    /// Lost probes as a percentage of all probes, 0..=100.
    pub packet_loss: f64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, set once at finalization.
    pub duration: i64,
    #[serde(
        rename = "error_message",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

impl TestRecord {
    /// Fresh record in the `Running` state with the clock started.
    pub fn new(id: String, source_node_id: String, target_node_id: String, kind: TestKind) -> Self {
        Self {
            id,
            source_node_id,
            target_node_id,
            kind,
            status: TestStatus::Running,
            download_speed: 0.0,
            upload_speed: 0.0,
            ping: 0.0,
            jitter: 0.0,
            packet_loss: 0.0,
            start_time: Utc::now(),
            end_time: None,
            duration: 0,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Synchronous rejection of a request, before any record exists or any
/// background task starts.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("unknown test kind: {0}")]
    UnknownKind(String),

    #[error("target_url is required")]
    MissingTarget,
}

/// Failure of a measurement strategy.
///
/// Individual worker errors are absorbed and logged; a strategy only fails
/// when it ends up with nothing to aggregate.
#[derive(Debug, Error)]
pub enum SpeedTestError {
    /// Every worker failed before transferring anything, so the aggregate
    /// duration is zero and no speed can be derived from it.
    #[error("{phase} test transferred no data")]
    NoData { phase: &'static str },

    #[error("no successful ping probes")]
    NoProbes,

    /// A phase of a full test failed; earlier phases' results stay on the
    /// record.
    #[error("{phase} phase: {source}")]
    Phase {
        phase: &'static str,
        #[source]
        source: Box<SpeedTestError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_values() {
        for (s, kind) in [
            ("download", TestKind::Download),
            ("upload", TestKind::Upload),
            ("ping", TestKind::Ping),
            ("full", TestKind::Full),
        ] {
            assert_eq!(s.parse::<TestKind>().unwrap(), kind);
        }
    }

    #[test]
    fn kind_rejects_unknown_value() {
        let err = "warp".parse::<TestKind>().unwrap_err();
        assert!(matches!(err, StartError::UnknownKind(_)));
    }

    #[test]
    fn status_terminal_set() {
        assert!(!TestStatus::Pending.is_terminal());
        assert!(!TestStatus::Running.is_terminal());
        assert!(TestStatus::Completed.is_terminal());
        assert!(TestStatus::Failed.is_terminal());
        assert!(TestStatus::Timeout.is_terminal());
    }

    #[test]
    fn record_wire_format_matches_panel_expectations() {
        let mut record = TestRecord::new(
            "t-1".into(),
            "node-a".into(),
            "node-b".into(),
            TestKind::Download,
        );
        record.status = TestStatus::Completed;
        record.download_speed = 812.5;

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "download");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["download_speed"], 812.5);
        // error_message is omitted on success
        assert!(json.get("error_message").is_none());
    }

    #[test]
    fn record_error_message_serialized_on_failure() {
        let mut record = TestRecord::new("t-2".into(), String::new(), String::new(), TestKind::Ping);
        record.status = TestStatus::Timeout;
        record.error = Some("test timed out".into());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error_message"], "test timed out");
    }

    #[test]
    fn full_phase_error_names_the_phase() {
        let err = SpeedTestError::Phase {
            phase: "download",
            source: Box::new(SpeedTestError::NoData { phase: "download" }),
        };
        let msg = err.to_string();
        assert!(msg.contains("download phase"));
    }
}
