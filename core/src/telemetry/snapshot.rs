//! telemetry/snapshot.rs
//! Immutable summary of one pipeline run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::counters::LaneCounters;
use crate::telemetry::timers::{StageTimes, TelemetryTimer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub lanes: usize,
    pub tasks: u64,
    pub chunks: u64,
    pub elements: u64,
    pub bytes_out: u64,
    pub elements_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl PipelineSnapshot {
    /// `counters` must be the egress-side totals: one task per acknowledgement.
    pub fn from(lanes: usize, counters: &LaneCounters, stage_times: StageTimes, timer: &TelemetryTimer) -> Self {
        let elapsed = timer.elapsed();
        let elements_per_sec = if elapsed.as_secs_f64() > 0.0 {
            counters.elements as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            lanes,
            tasks: counters.tasks,
            chunks: counters.chunks,
            elements: counters.elements,
            bytes_out: counters.bytes_out,
            elements_per_sec,
            elapsed,
            stage_times,
        }
    }

    pub fn total_stage_time(&self) -> Duration {
        self.stage_times.iter().map(|(_, d)| d).sum()
    }
}
