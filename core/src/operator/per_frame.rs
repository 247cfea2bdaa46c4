use std::io::Read;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use crossbeam::channel::{bounded, Sender};
use serde_json::Value;
use tracing::debug;

use crate::codec::{self, CodecError, DataType};
use crate::constants::QUEUE_CAPACITY;
use crate::operator::output::ChunkEncoder;
use crate::operator::types::{ApplyOutcome, Item, Operator, OperatorContext, RequestId, Task};
use crate::pipeline::OutputDefaults;
use crate::protocol::handlers::chunk_rows;
use crate::transform::{Element, Transform};
use crate::types::{Result, WorkerError};

/// Streams a task chunk by chunk: `/synchronized-reader` → transform per
/// element → `/build`, with the build consuming on its own thread.
pub struct PerFrameOperator {
    ctx: OperatorContext,
    transform: Box<dyn Transform>,
}

impl PerFrameOperator {
    pub fn new(ctx: OperatorContext, transform: Box<dyn Transform>) -> Self {
        Self { ctx, transform }
    }

    /// Feed `tx` until the reader is exhausted. Returns early, without
    /// error, when the build side stops consuming.
    fn produce(
        &mut self,
        reader: &mut dyn Read,
        item_metadata: &[Value],
        encoder: &mut ChunkEncoder,
        tx: &Sender<Result<Bytes>>,
    ) -> Result<()> {
        let input_types = self.ctx.meta.input_types();
        let output_types: Vec<DataType> = self.ctx.meta.output_types();

        loop {
            let datas = match codec::read_slots(reader, &input_types) {
                Ok(datas) => datas,
                Err(CodecError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            let rows = chunk_rows(&datas, item_metadata)?;
            let outputs = rows
                .iter()
                .map(|row| -> Result<Vec<Element>> { Ok(self.transform.apply_checked(row, &output_types)?) })
                .collect::<Result<Vec<_>>>()?;

            if !encoder.metas_sent() {
                encoder.set_defaults(OutputDefaults::derive(&datas, item_metadata));
                let metas = encoder.metas(outputs.first().map(Vec::as_slice))?;
                if tx.send(Ok(metas)).is_err() {
                    return Ok(());
                }
            }
            if tx.send(Ok(encoder.rows(outputs)?)).is_err() {
                return Ok(());
            }
        }

        if !encoder.metas_sent() {
            let _ = tx.send(Ok(encoder.metas(None)?));
        }
        Ok(())
    }
}

impl Operator for PerFrameOperator {
    fn apply(&mut self, request_id: RequestId, task: Task) -> Result<ApplyOutcome> {
        let items = task.input_items();
        let item_metadata: Vec<Value> = items.iter().map(Item::metadata).collect();
        let mut reader = self.ctx.collaborator.synchronized_reader(&items)?;
        let mut encoder = ChunkEncoder::new(&self.ctx.meta.outputs, &task.key, OutputDefaults::default());

        let (tx, rx) = bounded::<Result<Bytes>>(QUEUE_CAPACITY);
        let collaborator = Arc::clone(&self.ctx.collaborator);
        let builder = thread::Builder::new()
            .name(format!("build-{}", request_id))
            .spawn(move || collaborator.build(Box::new(rx.into_iter())))
            .map_err(WorkerError::Io)?;

        let produced = self.produce(&mut reader, &item_metadata, &mut encoder, &tx);
        if let Err(e) = &produced {
            // Fail the body so the orchestrator discards the partial output.
            let _ = tx.send(Err(WorkerError::Collaborator(format!("task {} aborted: {}", task.key, e))));
        }
        drop(tx);

        let built = builder
            .join()
            .map_err(|_| WorkerError::LaneFailure("build thread panicked".to_string()))?;
        produced?;
        built?;

        debug!(request_id, key = %task.key, "per-frame task built");
        Ok(ApplyOutcome::Completed)
    }
}
