use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::collaborator::Collaborator;
use crate::operator::output::ChunkEncoder;
use crate::pipeline::channel::{recv_or_halt, HaltSignal};
use crate::pipeline::health::LaneReport;
use crate::pipeline::types::{EgressMessage, OutputDefaults, WorkerId};
use crate::protocol::{Dataset, SidebandWriter};
use crate::telemetry::Stage;
use crate::transform::Element;
use crate::types::{Result, WorkerError};

/// Egress lane: own queue → `/build` → acknowledgement.
pub struct Egress {
    pub worker_id: WorkerId,
    pub outputs: Vec<Dataset>,
    pub collaborator: Arc<dyn Collaborator>,
    pub inbox: Receiver<EgressMessage>,
    pub acks: SidebandWriter,
    /// Open-task tokens; one is taken back per acknowledged task.
    pub gate: Receiver<()>,
    pub halt: HaltSignal,
}

impl Egress {
    /// One `/build` call per task, opened on `Init` and fed until `Close`.
    /// The task is acknowledged only after the build returns.
    pub fn run(self) -> Result<LaneReport> {
        let mut report = LaneReport::default();

        while let Some(msg) = recv_or_halt(&self.inbox, &self.halt)? {
            let (request_id, key, defaults) = match msg {
                EgressMessage::Init { request_id, task, defaults } => (request_id, task.key, defaults),
                EgressMessage::Result { .. } | EgressMessage::Close => {
                    return Err(WorkerError::ProtocolViolation(format!(
                        "egress-{} got data before Init",
                        self.worker_id
                    )));
                }
            };

            let task_report = self.build_task(&key, defaults)?;
            report.counters.merge(&task_report.counters);
            report.stage_times.merge(&task_report.stage_times);
            report.counters.add_task();

            self.acks.ack(request_id)?;
            // Token may be missing when tasks bypass `submit`.
            let _ = self.gate.try_recv();
            debug!(worker_id = self.worker_id, request_id, key = %key, "task acknowledged");
        }

        Ok(report)
    }

    fn build_task(&self, key: &str, defaults: OutputDefaults) -> Result<LaneReport> {
        let (done_tx, done_rx) = bounded(1);
        let body = EgressBody {
            encoder: ChunkEncoder::new(&self.outputs, key, defaults),
            inbox: self.inbox.clone(),
            halt: self.halt.clone(),
            pending: None,
            finished: false,
            report: LaneReport::default(),
            done: Some(done_tx),
        };

        if let Err(e) = self.collaborator.build(Box::new(body)) {
            if self.halt.is_halted() {
                return Err(WorkerError::Halted);
            }
            return Err(e);
        }

        done_rx
            .try_recv()
            .map_err(|_| WorkerError::LaneFailure(format!("build for {:?} returned before the task closed", key)))
    }
}

/// Request body of one `/build` call: the metas frame, then one encoded
/// chunk per compute result, until `Close`.
struct EgressBody {
    encoder: ChunkEncoder,
    inbox: Receiver<EgressMessage>,
    halt: HaltSignal,
    pending: Option<Bytes>,
    finished: bool,
    report: LaneReport,
    done: Option<Sender<LaneReport>>,
}

impl EgressBody {
    fn on_result(&mut self, rows: Vec<Vec<Element>>) -> Result<Bytes> {
        let metas = if self.encoder.metas_sent() {
            None
        } else {
            Some(self.encoder.metas(rows.first().map(Vec::as_slice))?)
        };

        let elements = rows.len();
        let encoder = &self.encoder;
        let chunk = self.report.stage_times.measure(Stage::Encode, || encoder.rows(rows))?;
        self.report.counters.add_chunk(elements);
        self.report.counters.add_bytes_out(chunk.len());

        match metas {
            Some(metas) => {
                self.pending = Some(chunk);
                Ok(metas)
            }
            None => Ok(chunk),
        }
    }

    fn fail(&mut self, err: WorkerError) -> Option<Result<Bytes>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl Iterator for EgressBody {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(chunk) = self.pending.take() {
            return Some(Ok(chunk));
        }
        if self.finished {
            return None;
        }

        match recv_or_halt(&self.inbox, &self.halt) {
            Ok(Some(EgressMessage::Result { rows })) => match self.on_result(rows) {
                Ok(chunk) => Some(Ok(chunk)),
                Err(e) => self.fail(e),
            },
            Ok(Some(EgressMessage::Close)) => {
                self.finished = true;
                let tail = if self.encoder.metas_sent() { None } else { Some(self.encoder.metas(None)) };
                if let Some(done) = self.done.take() {
                    let _ = done.send(std::mem::take(&mut self.report));
                }
                tail
            }
            Ok(Some(EgressMessage::Init { .. })) => self.fail(WorkerError::ProtocolViolation(format!(
                "Init for a new task while {:?} is still open",
                self.encoder.key()
            ))),
            Ok(None) => self.fail(WorkerError::LaneFailure(format!(
                "compute hung up during {:?}",
                self.encoder.key()
            ))),
            Err(e) => self.fail(e),
        }
    }
}
