//! Sync run configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the sync orchestrator and scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of employees reconciled concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on a single provisioner fetch or apply call.
    #[serde(default = "default_provisioner_timeout_ms")]
    pub provisioner_timeout_ms: u64,

    /// Interval between scheduled runs in `serve` mode.
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,

    /// Whether scheduled runs are dry runs.
    #[serde(default = "default_scheduled_dry_run")]
    pub scheduled_dry_run: bool,
}

impl SyncConfig {
    pub fn provisioner_timeout(&self) -> Duration {
        Duration::from_millis(self.provisioner_timeout_ms)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            provisioner_timeout_ms: default_provisioner_timeout_ms(),
            schedule_interval_secs: default_schedule_interval_secs(),
            scheduled_dry_run: default_scheduled_dry_run(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_provisioner_timeout_ms() -> u64 {
    10_000
}

fn default_schedule_interval_secs() -> u64 {
    3600
}

fn default_scheduled_dry_run() -> bool {
    true
}
