//! Ping measurement: sequential HTTP round-trip probes.
//!
//! Probes run one after another with a fixed inter-probe delay, never in
//! parallel, so the measurement does not congest itself and skew latency.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{target_endpoint, Strategy};
use crate::speedtest::{SpeedTestError, TestRecord};

pub struct PingStrategy {
    client: Client,
    count: u32,
    interval: Duration,
}

impl PingStrategy {
    pub fn new(client: Client, count: u32, interval: Duration) -> Self {
        Self {
            client,
            count,
            interval,
        }
    }
}

#[async_trait]
impl Strategy for PingStrategy {
    async fn run(&self, target: &str, record: &mut TestRecord) -> Result<(), SpeedTestError> {
        let url = target_endpoint(target, "/speedtest/ping");
        debug!(url = %url, count = self.count, "starting ping measurement");

        let mut samples: Vec<f64> = Vec::with_capacity(self.count as usize);
        let mut lost: u32 = 0;

        for probe in 0..self.count {
            let started = Instant::now();

            let resp = match self
                .client
                .get(&url)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(probe, error = %e, "ping probe failed");
                    lost += 1;
                    continue;
                }
            };

            // A probe only counts once its response is fully read.
            if let Err(e) = resp.bytes().await {
                warn!(probe, error = %e, "ping response read failed");
                lost += 1;
                continue;
            }

            samples.push(started.elapsed().as_secs_f64() * 1000.0);
            tokio::time::sleep(self.interval).await;
        }

        if samples.is_empty() {
            return Err(SpeedTestError::NoProbes);
        }

        let (mean, jitter) = latency_stats(&samples);
        record.ping = mean;
        record.jitter = jitter;
        record.packet_loss = lost as f64 / self.count as f64 * 100.0;

        debug!(
            mean_ms = record.ping,
            jitter_ms = record.jitter,
            loss_pct = record.packet_loss,
            "ping measurement complete"
        );
        Ok(())
    }
}

/// Mean latency and jitter (mean absolute difference between consecutive
/// samples) in milliseconds. Jitter is 0 with fewer than two samples.
pub(crate) fn latency_stats(samples: &[f64]) -> (f64, f64) {
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;

    let jitter = if samples.len() > 1 {
        samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .sum::<f64>()
            / (samples.len() - 1) as f64
    } else {
        0.0
    };

    (mean, jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_for_a_single_sample() {
        let (mean, jitter) = latency_stats(&[42.0]);
        assert_eq!(mean, 42.0);
        assert_eq!(jitter, 0.0);
    }

    #[test]
    fn stats_for_steady_latency() {
        let (mean, jitter) = latency_stats(&[10.0, 10.0, 10.0, 10.0]);
        assert_eq!(mean, 10.0);
        assert_eq!(jitter, 0.0);
    }

    #[test]
    fn jitter_is_mean_absolute_consecutive_difference() {
        // Diffs: |20-10|=10, |5-20|=15, |25-5|=20 -> mean 15.
        let (mean, jitter) = latency_stats(&[10.0, 20.0, 5.0, 25.0]);
        assert!((mean - 15.0).abs() < 1e-9);
        assert!((jitter - 15.0).abs() < 1e-9);
    }
}
