//! Test orchestrator: creates records, supervises measurements under a
//! deadline, resolves terminal states, and triggers reporting and expiry.
//!
//! An orchestrator is an explicit instance built from injected collaborators
//! (registry, report sink, options) so tests can run it in isolation. There
//! is no global state and no cap on concurrent in-flight tests at this
//! layer; admission control belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::SpeedTestOptions;

use super::strategy::{
    DownloadStrategy, FullStrategy, PingStrategy, Strategy, UploadStrategy,
};
use super::{
    sweeper, ReportSink, ResultRegistry, StartError, TestKind, TestRecord, TestRequest, TestStatus,
};

/// Per-request HTTP timeout for measurement and report traffic. This bounds
/// a single request, not the test; the test deadline is separate.
const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    registry: Arc<ResultRegistry>,
    reporter: Arc<dyn ReportSink>,
    client: Client,
    opts: SpeedTestOptions,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ResultRegistry>,
        reporter: Arc<dyn ReportSink>,
        opts: SpeedTestOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(HTTP_CLIENT_TIMEOUT)
            .user_agent(concat!("nodemeter/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self {
            registry,
            reporter,
            client,
            opts,
        }
    }

    /// Shared HTTP client, reused by the reporter and heartbeat loop.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }

    /// Validate a request, create its record, and launch the measurement in
    /// the background. Returns the initial `Running` snapshot immediately.
    ///
    /// Validation failures reject synchronously: no record is created and no
    /// task is spawned.
    pub async fn start_test(&self, req: TestRequest) -> Result<TestRecord, StartError> {
        if req.target_url.trim().is_empty() {
            return Err(StartError::MissingTarget);
        }

        let id = if req.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            req.id.clone()
        };

        let timeout = if req.timeout == 0 {
            Duration::from_secs(self.opts.default_timeout_secs)
        } else {
            Duration::from_secs(req.timeout)
        };

        let strategy = self.strategy_for(req.kind, req.threads);
        let record = self.registry.create(&req, id.clone()).await;

        info!(
            test_id = %id,
            kind = %req.kind,
            target = %req.target_url,
            timeout_secs = timeout.as_secs(),
            "speed test started"
        );

        let registry = Arc::clone(&self.registry);
        let reporter = Arc::clone(&self.reporter);
        let retention = Duration::from_secs(self.opts.retention_secs);
        let target = req.target_url.clone();
        let initial = record.clone();

        tokio::spawn(async move {
            supervise(registry, reporter, strategy, initial, target, timeout, retention).await;
        });

        Ok(record)
    }

    /// Snapshot read of one result.
    pub async fn get_result(&self, id: &str) -> Option<TestRecord> {
        self.registry.get(id).await
    }

    /// Snapshot of all current results.
    pub async fn list_results(&self) -> Vec<TestRecord> {
        self.registry.list().await
    }

    fn strategy_for(&self, kind: TestKind, threads: u32) -> Box<dyn Strategy> {
        let opts = &self.opts;
        // A nonzero request value overrides the per-kind default. Ping is
        // sequential and uses a fixed probe count, never a worker count.
        let download_workers = if threads == 0 {
            opts.download_workers
        } else {
            threads
        };
        let upload_workers = if threads == 0 {
            opts.upload_workers
        } else {
            threads
        };
        let ping = || {
            PingStrategy::new(
                self.client.clone(),
                opts.ping_count,
                Duration::from_millis(opts.ping_interval_ms),
            )
        };
        let download = || {
            DownloadStrategy::new(self.client.clone(), download_workers, opts.download_size_mb)
        };
        let upload =
            || UploadStrategy::new(self.client.clone(), upload_workers, opts.upload_payload_mb);

        match kind {
            TestKind::Download => Box::new(download()),
            TestKind::Upload => Box::new(upload()),
            TestKind::Ping => Box::new(ping()),
            TestKind::Full => Box::new(FullStrategy::new(ping(), download(), upload())),
        }
    }
}

/// Run one measurement to its terminal state.
///
/// The deadline cancels the *wait*, not the work: when it fires, the record
/// finalizes as `Timeout` immediately, but transfer workers already spawned
/// by the strategy are detached tasks and run to natural completion. Their
/// late contributions die with the dropped strategy future and are never
/// published.
async fn supervise(
    registry: Arc<ResultRegistry>,
    reporter: Arc<dyn ReportSink>,
    strategy: Box<dyn Strategy>,
    mut record: TestRecord,
    target: String,
    timeout: Duration,
    retention: Duration,
) {
    let id = record.id.clone();

    match tokio::time::timeout(timeout, strategy.run(&target, &mut record)).await {
        Ok(Ok(())) => {
            record.status = TestStatus::Completed;
            info!(test_id = %id, "speed test completed");
        }
        Ok(Err(e)) => {
            record.status = TestStatus::Failed;
            record.error = Some(e.to_string());
            warn!(test_id = %id, error = %e, "speed test failed");
        }
        Err(_) => {
            record.status = TestStatus::Timeout;
            record.error = Some("test timed out".to_string());
            warn!(test_id = %id, timeout_secs = timeout.as_secs(), "speed test timed out");
        }
    }

    let end = Utc::now();
    record.duration = (end - record.start_time).num_milliseconds();
    record.end_time = Some(end);

    registry.publish(record.clone()).await;

    // Fire-and-forget report; never blocks finalization.
    let reported = record.clone();
    tokio::spawn(async move {
        reporter.deliver(&reported).await;
    });

    sweeper::schedule_removal(registry, id, retention);
}
