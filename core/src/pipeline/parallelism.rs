use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{DEFAULT_MAX_OPEN_TASKS, DEFAULT_WATCHDOG_INTERVAL_MS};
use crate::types::{Result, WorkerError};

/// Lane count and supervision settings of the pipeline runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineProfile {
    /// Ingress/egress lane pairs.
    pub lanes: usize,
    /// Watchdog polling interval.
    pub watchdog_interval_ms: u64,
    /// Tasks submitted but not yet acknowledged by egress.
    pub max_open_tasks: usize,
}

impl PipelineProfile {
    pub fn single_lane() -> Self {
        Self {
            lanes: 1,
            watchdog_interval_ms: DEFAULT_WATCHDOG_INTERVAL_MS,
            max_open_tasks: DEFAULT_MAX_OPEN_TASKS,
        }
    }

    /// One lane per spare core (cores − 1), at least 1, at most `hard_cap`.
    pub fn dynamic(hard_cap: usize) -> Self {
        let cores = num_cpus::get();
        let lanes = cores.saturating_sub(1).clamp(1, hard_cap.max(1));
        info!(cores, lanes, "pipeline profile");

        Self {
            lanes,
            max_open_tasks: DEFAULT_MAX_OPEN_TASKS.max(lanes),
            ..Self::single_lane()
        }
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lanes == 0 {
            return Err(WorkerError::Config("pipeline needs at least one lane".to_string()));
        }
        if self.watchdog_interval_ms == 0 {
            return Err(WorkerError::Config("watchdog interval must be positive".to_string()));
        }
        if self.max_open_tasks == 0 {
            return Err(WorkerError::Config("max_open_tasks must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for PipelineProfile {
    fn default() -> Self {
        Self::single_lane()
    }
}
