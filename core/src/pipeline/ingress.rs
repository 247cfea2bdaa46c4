use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use serde_json::Value;
use tracing::debug;

use crate::codec::{self, CodecError, DataType};
use crate::collaborator::Collaborator;
use crate::operator::Item;
use crate::pipeline::channel::{recv_or_halt, send_or_halt, HaltSignal};
use crate::pipeline::health::LaneReport;
use crate::pipeline::types::{ComputeMessage, OutputDefaults, PipelineJob, WorkerId};
use crate::protocol::handlers::chunk_rows;
use crate::telemetry::Stage;
use crate::types::Result;

/// Ingress lane: task queue → `/synchronized-reader` → compute queue.
pub struct Ingress {
    pub worker_id: WorkerId,
    pub input_types: Vec<DataType>,
    pub collaborator: Arc<dyn Collaborator>,
    pub tasks: Receiver<PipelineJob>,
    pub compute: Sender<ComputeMessage>,
    pub halt: HaltSignal,
}

impl Ingress {
    /// Per task: `Init` (before the first `Infer`), one `Infer` per chunk,
    /// then `Close`. Returns when the task queue closes.
    pub fn run(self) -> Result<LaneReport> {
        let mut report = LaneReport::default();

        while let Some(job) = recv_or_halt(&self.tasks, &self.halt)? {
            debug!(worker_id = self.worker_id, request_id = job.request_id, key = %job.task.key, "ingress task");
            self.stream_task(job, &mut report)?;
            report.counters.add_task();
        }

        Ok(report)
    }

    fn stream_task(&self, job: PipelineJob, report: &mut LaneReport) -> Result<()> {
        let items = job.task.input_items();
        let item_metadata: Vec<Value> = items.iter().map(Item::metadata).collect();
        let mut reader = self.collaborator.synchronized_reader(&items)?;

        let mut pending_init = Some(job);
        loop {
            let read = report
                .stage_times
                .measure(Stage::Read, || codec::read_slots(&mut reader, &self.input_types));
            let datas = match read {
                Ok(datas) => datas,
                Err(CodecError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            if let Some(job) = pending_init.take() {
                let defaults = OutputDefaults::derive(&datas, &item_metadata);
                self.send_init(job, defaults)?;
            }

            let rows = chunk_rows(&datas, &item_metadata)?;
            report.counters.add_chunk(rows.len());
            send_or_halt(
                &self.compute,
                ComputeMessage::Infer { worker_id: self.worker_id, rows },
                &self.halt,
            )?;
        }

        // No chunks at all: egress still needs an Init to open and close `/build`.
        if let Some(job) = pending_init.take() {
            self.send_init(job, OutputDefaults::default())?;
        }

        send_or_halt(&self.compute, ComputeMessage::Close { worker_id: self.worker_id }, &self.halt)
    }

    fn send_init(&self, job: PipelineJob, defaults: OutputDefaults) -> Result<()> {
        send_or_halt(
            &self.compute,
            ComputeMessage::Init {
                worker_id: self.worker_id,
                request_id: job.request_id,
                task: job.task,
                defaults,
            },
            &self.halt,
        )
    }
}
