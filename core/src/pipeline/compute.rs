use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, info};

use crate::codec::DataType;
use crate::pipeline::channel::{recv_or_halt, send_or_halt, HaltSignal};
use crate::pipeline::health::LaneReport;
use crate::pipeline::types::{ComputeMessage, EgressMessage, WorkerId};
use crate::telemetry::Stage;
use crate::transform::{Element, TransformFactory};
use crate::types::{Result, WorkerError};

/// The single compute stage. Sole owner of the transform.
pub struct Compute {
    pub transform: TransformFactory,
    pub output_types: Vec<DataType>,
    pub inbox: Receiver<ComputeMessage>,
    pub egress: Vec<Sender<EgressMessage>>,
    pub halt: HaltSignal,
}

impl Compute {
    /// Handle messages strictly in arrival order: `Init`/`Close` are forwarded
    /// unchanged, `Infer` is replaced by its result. Returns once every
    /// ingress lane has hung up.
    pub fn run(self) -> Result<LaneReport> {
        // Built here so the transform never crosses threads.
        let mut transform = (self.transform)()?;
        info!(transform = transform.name(), lanes = self.egress.len(), "compute stage ready");

        let mut report = LaneReport::default();

        while let Some(msg) = recv_or_halt(&self.inbox, &self.halt)? {
            let worker_id = msg.worker_id();
            let out = match msg {
                ComputeMessage::Init { request_id, task, defaults, .. } => {
                    debug!(worker_id, request_id, "compute init");
                    EgressMessage::Init { request_id, task, defaults }
                }
                ComputeMessage::Infer { rows, .. } => {
                    let output_types = &self.output_types;
                    let outputs = report.stage_times.measure(Stage::Transform, || {
                        rows.iter()
                            .map(|row| transform.apply_checked(row, output_types))
                            .collect::<Result<Vec<Vec<Element>>, _>>()
                    })?;
                    report.counters.add_chunk(outputs.len());
                    EgressMessage::Result { rows: outputs }
                }
                ComputeMessage::Close { .. } => EgressMessage::Close,
            };
            self.forward(worker_id, out)?;
        }

        Ok(report)
    }

    fn forward(&self, worker_id: WorkerId, msg: EgressMessage) -> Result<()> {
        let tx = self
            .egress
            .get(worker_id)
            .ok_or_else(|| WorkerError::LaneFailure(format!("no egress lane {}", worker_id)))?;
        send_or_halt(tx, msg, &self.halt)
    }
}
