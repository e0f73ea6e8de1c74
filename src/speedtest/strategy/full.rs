//! Full measurement: ping, then download, then upload.
//!
//! The chain aborts on the first failing phase, with the phase name folded
//! into the error. Fields written by phases that already completed stay on
//! the record, so a failed full test still reports whatever succeeded.

use async_trait::async_trait;

use super::{DownloadStrategy, PingStrategy, Strategy, UploadStrategy};
use crate::speedtest::{SpeedTestError, TestRecord};

pub struct FullStrategy {
    ping: PingStrategy,
    download: DownloadStrategy,
    upload: UploadStrategy,
}

impl FullStrategy {
    pub fn new(ping: PingStrategy, download: DownloadStrategy, upload: UploadStrategy) -> Self {
        Self {
            ping,
            download,
            upload,
        }
    }
}

#[async_trait]
impl Strategy for FullStrategy {
    async fn run(&self, target: &str, record: &mut TestRecord) -> Result<(), SpeedTestError> {
        self.ping
            .run(target, record)
            .await
            .map_err(|e| SpeedTestError::Phase {
                phase: "ping",
                source: Box::new(e),
            })?;

        self.download
            .run(target, record)
            .await
            .map_err(|e| SpeedTestError::Phase {
                phase: "download",
                source: Box::new(e),
            })?;

        self.upload
            .run(target, record)
            .await
            .map_err(|e| SpeedTestError::Phase {
                phase: "upload",
                source: Box::new(e),
            })?;

        Ok(())
    }
}
