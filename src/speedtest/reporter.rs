//! Result reporter: fire-and-forget delivery of finished records.
//!
//! Delivery is at-most-once. Failures are logged and discarded; they are
//! never retried and never change the record's terminal status.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::TestRecord;

/// Destination for finished test records.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, record: &TestRecord);
}

/// Reporter posting records to the panel's collector endpoint, authenticated
/// with the node's shared key.
pub struct HttpReporter {
    client: Client,
    collector_url: String,
    node_key: String,
}

impl HttpReporter {
    pub fn new(client: Client, panel_url: &str, node_key: &str) -> Self {
        Self {
            client,
            collector_url: format!(
                "{}/api/node/speedtest/result",
                panel_url.trim_end_matches('/')
            ),
            node_key: node_key.to_string(),
        }
    }
}

#[async_trait]
impl ReportSink for HttpReporter {
    async fn deliver(&self, record: &TestRecord) {
        let result = self
            .client
            .post(&self.collector_url)
            .header("Node-Key", &self.node_key)
            .json(record)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(test_id = %record.id, "test report delivered");
            }
            Ok(resp) => {
                warn!(
                    test_id = %record.id,
                    status = %resp.status(),
                    "collector rejected test report"
                );
            }
            Err(e) => {
                warn!(test_id = %record.id, error = %e, "test report delivery failed");
            }
        }
    }
}

/// Sink used when no panel is configured. Reports go nowhere.
pub struct NullReporter;

#[async_trait]
impl ReportSink for NullReporter {
    async fn deliver(&self, record: &TestRecord) {
        debug!(test_id = %record.id, "no collector configured, dropping report");
    }
}
