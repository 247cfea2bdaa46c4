use tracing::info;

use crate::operator::types::{ApplyOutcome, Operator, RequestId, Task};
use crate::pipeline::{PipelineJob, PipelineRuntime};
use crate::telemetry::PipelineSnapshot;
use crate::types::{Result, WorkerError};

/// Hands tasks to the pipeline runtime; egress acknowledges them.
pub struct PipelinedOperator {
    runtime: Option<PipelineRuntime>,
    lanes: usize,
    snapshot: Option<PipelineSnapshot>,
}

impl PipelinedOperator {
    pub fn new(runtime: PipelineRuntime) -> Self {
        let lanes = runtime.profile().lanes;
        Self { runtime: Some(runtime), lanes, snapshot: None }
    }

    /// Summary of the run, once closed.
    pub fn snapshot(&self) -> Option<&PipelineSnapshot> {
        self.snapshot.as_ref()
    }
}

impl Operator for PipelinedOperator {
    fn parallelism(&self) -> usize {
        self.lanes
    }

    fn apply(&mut self, request_id: RequestId, task: Task) -> Result<ApplyOutcome> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| WorkerError::LaneFailure("pipeline is closed".to_string()))?;
        runtime.submit(PipelineJob { request_id, task })?;
        Ok(ApplyOutcome::Deferred)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(runtime) = self.runtime.take() {
            let snapshot = runtime.close()?;
            info!(tasks = snapshot.tasks, elements_per_sec = snapshot.elements_per_sec, "pipelined operator closed");
            self.snapshot = Some(snapshot);
        }
        Ok(())
    }
}
