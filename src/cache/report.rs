//! Per-configuration resolve reports
//!
//! Written as JSON under the resolution cache as `<resolve id>-<conf>.json`.

use serde::{Deserialize, Serialize};

use crate::cache::download::{DownloadReport, DownloadStatus};
use crate::utils::current_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationReport {
    pub resolve_id: String,
    pub conf: String,
    /// Unix seconds
    pub generated_at: u64,
    pub artifacts: Vec<DownloadReport>,
}

impl ConfigurationReport {
    pub fn new(resolve_id: impl Into<String>, conf: impl Into<String>, artifacts: Vec<DownloadReport>) -> Self {
        Self {
            resolve_id: resolve_id.into(),
            conf: conf.into(),
            generated_at: current_timestamp(),
            artifacts,
        }
    }

    pub fn count(&self, status: DownloadStatus) -> usize {
        self.artifacts.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(DownloadStatus::Failed) > 0
    }

    pub fn total_size(&self) -> u64 {
        self.artifacts.iter().map(|r| r.size).sum()
    }
}
