//! Upload measurement: M parallel POSTs of one shared random payload.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use reqwest::Client;
use tracing::{debug, warn};

use super::{mbps, target_endpoint, Strategy, TransferTotals};
use crate::speedtest::{SpeedTestError, TestRecord};

pub struct UploadStrategy {
    client: Client,
    workers: u32,
    /// Payload size in MB (2^20 bytes).
    payload_mb: u32,
}

impl UploadStrategy {
    pub fn new(client: Client, workers: u32, payload_mb: u32) -> Self {
        Self {
            client,
            workers,
            payload_mb,
        }
    }

    /// One random payload, generated once and shared by every worker.
    /// The test exercises transmit-path cost, not content variety.
    fn generate_payload(&self) -> Bytes {
        let size = self.payload_mb as usize * 1024 * 1024;
        let mut payload = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut payload);
        Bytes::from(payload)
    }
}

#[async_trait]
impl Strategy for UploadStrategy {
    async fn run(&self, target: &str, record: &mut TestRecord) -> Result<(), SpeedTestError> {
        let url = target_endpoint(target, "/speedtest/upload");
        let payload = self.generate_payload();
        debug!(url = %url, workers = self.workers, payload_bytes = payload.len(), "starting upload measurement");

        let totals = Arc::new(Mutex::new(TransferTotals::default()));
        let mut handles = Vec::with_capacity(self.workers as usize);

        for worker in 0..self.workers {
            let client = self.client.clone();
            let url = url.clone();
            let payload = payload.clone();
            let totals = Arc::clone(&totals);

            handles.push(tokio::spawn(async move {
                let sent = payload.len() as u64;
                let started = Instant::now();

                let resp = match client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(payload)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(worker, error = %e, "upload request failed");
                        return;
                    }
                };

                // The transfer is only counted once the response body has
                // been fully read; elapsed time includes that read.
                if let Err(e) = resp.bytes().await {
                    warn!(worker, error = %e, "upload response read failed");
                    return;
                }

                let elapsed = started.elapsed();
                TransferTotals::add(&totals, sent, elapsed);
                debug!(worker, bytes = sent, elapsed_ms = elapsed.as_millis() as u64, "upload worker finished");
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let (bytes, elapsed) = {
            let t = totals.lock().expect("transfer totals lock poisoned");
            (t.bytes, t.elapsed)
        };

        if elapsed.is_zero() {
            return Err(SpeedTestError::NoData { phase: "upload" });
        }

        record.upload_speed = mbps(bytes, elapsed);
        debug!(speed_mbps = record.upload_speed, "upload measurement complete");
        Ok(())
    }
}
