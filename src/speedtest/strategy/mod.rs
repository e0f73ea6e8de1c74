//! Measurement strategies.
//!
//! Four interchangeable algorithms behind one trait: download, upload, ping,
//! and the full composite. A strategy executes against a target node's base
//! URL and writes its figures into the record it is handed; the supervising
//! task owns that record, so strategies never touch shared state.

pub mod download;
pub mod full;
pub mod ping;
pub mod upload;

pub use download::DownloadStrategy;
pub use full::FullStrategy;
pub use ping::PingStrategy;
pub use upload::UploadStrategy;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{SpeedTestError, TestRecord};

/// A single measurement algorithm.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Run the measurement against `target` (a base URL exposing the
    /// standard target endpoints) and record the results in place.
    async fn run(&self, target: &str, record: &mut TestRecord) -> Result<(), SpeedTestError>;
}

/// Shared accumulator for parallel transfer workers.
///
/// `elapsed` is the *sum* of per-worker wall times, not overall wall clock:
/// the derived figure approximates aggregate throughput capacity rather than
/// true concurrent bandwidth. The lock is held only for the increment.
#[derive(Default)]
pub(crate) struct TransferTotals {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferTotals {
    pub fn add(totals: &Mutex<Self>, bytes: u64, elapsed: Duration) {
        let mut t = totals.lock().expect("transfer totals lock poisoned");
        t.bytes += bytes;
        t.elapsed += elapsed;
    }
}

/// Megabits per second from a byte count and an aggregate duration.
pub(crate) fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 * 8.0 / elapsed.as_secs_f64() / 1_000_000.0
}

/// Join a target base URL with one of the well-known speed-test paths.
pub(crate) fn target_endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
