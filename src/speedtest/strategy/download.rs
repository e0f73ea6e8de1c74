//! Download measurement: N parallel streaming reads against the target.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{mbps, target_endpoint, Strategy, TransferTotals};
use crate::speedtest::{SpeedTestError, TestRecord};

pub struct DownloadStrategy {
    client: Client,
    workers: u32,
    /// Size parameter passed to the target, in MB (2^20 bytes).
    size_mb: u32,
}

impl DownloadStrategy {
    pub fn new(client: Client, workers: u32, size_mb: u32) -> Self {
        Self {
            client,
            workers,
            size_mb,
        }
    }
}

#[async_trait]
impl Strategy for DownloadStrategy {
    async fn run(&self, target: &str, record: &mut TestRecord) -> Result<(), SpeedTestError> {
        let url = format!(
            "{}?size={}",
            target_endpoint(target, "/speedtest/download"),
            self.size_mb
        );
        debug!(url = %url, workers = self.workers, "starting download measurement");

        let totals = Arc::new(Mutex::new(TransferTotals::default()));
        let mut handles = Vec::with_capacity(self.workers as usize);

        for worker in 0..self.workers {
            let client = self.client.clone();
            let url = url.clone();
            let totals = Arc::clone(&totals);

            handles.push(tokio::spawn(async move {
                let started = Instant::now();

                let resp = match client
                    .get(&url)
                    .header(reqwest::header::CACHE_CONTROL, "no-cache")
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(worker, error = %e, "download request failed");
                        return;
                    }
                };

                // Drain the body while counting bytes. A mid-stream error
                // discards this worker's contribution entirely.
                let mut resp = resp;
                let mut received: u64 = 0;
                loop {
                    match resp.chunk().await {
                        Ok(Some(chunk)) => received += chunk.len() as u64,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(worker, error = %e, "download stream aborted");
                            return;
                        }
                    }
                }

                let elapsed = started.elapsed();
                TransferTotals::add(&totals, received, elapsed);
                debug!(worker, bytes = received, elapsed_ms = elapsed.as_millis() as u64, "download worker finished");
            }));
        }

        // Wait-for-all barrier: no partial aggregate is ever read.
        for handle in handles {
            let _ = handle.await;
        }

        let (bytes, elapsed) = {
            let t = totals.lock().expect("transfer totals lock poisoned");
            (t.bytes, t.elapsed)
        };

        if elapsed.is_zero() {
            return Err(SpeedTestError::NoData { phase: "download" });
        }

        record.download_speed = mbps(bytes, elapsed);
        debug!(speed_mbps = record.download_speed, "download measurement complete");
        Ok(())
    }
}
