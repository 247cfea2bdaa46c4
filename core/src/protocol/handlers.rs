use tracing::debug;

use crate::codec::{DataType, TypedPayload};
use crate::protocol::context::OutputSink;
use crate::protocol::session::JobHandler;
use crate::protocol::types::{JobDescriptor, JobKind, WorkerState};
use crate::transform::{Element, Transform};
use crate::types::{Result, WorkerError};

/// Run the transform once per element of a job chunk and re-stack the
/// results per output slot, in element order.
pub fn map_elements(
    transform: &mut dyn Transform,
    inputs: &[TypedPayload],
    output_types: &[DataType],
) -> Result<Vec<TypedPayload>> {
    let rows = chunk_rows(inputs, &[])?;
    let outputs = rows
        .iter()
        .map(|row| -> Result<Vec<Element>> { Ok(transform.apply_checked(row, output_types)?) })
        .collect::<Result<Vec<_>>>()?;
    stack_outputs(output_types, outputs)
}

/// Split a chunk into rows of one single-element payload per slot.
///
/// `metadata[i]`, when present, is attached to every element of slot `i`.
pub fn chunk_rows(inputs: &[TypedPayload], metadata: &[serde_json::Value]) -> Result<Vec<Vec<Element>>> {
    let n = inputs.first().map(TypedPayload::len).unwrap_or(0);
    (0..n)
        .map(|i| -> Result<Vec<Element>> {
            inputs
                .iter()
                .enumerate()
                .map(|(slot, payload)| -> Result<Element> {
                    let meta = metadata.get(slot).cloned().unwrap_or(serde_json::Value::Null);
                    Ok(Element::new(payload.slice(i)?, meta))
                })
                .collect()
        })
        .collect()
}

/// Transpose per-element outputs into one stacked payload per output slot.
pub fn stack_outputs(output_types: &[DataType], rows: Vec<Vec<Element>>) -> Result<Vec<TypedPayload>> {
    let mut columns: Vec<Vec<TypedPayload>> = vec![Vec::with_capacity(rows.len()); output_types.len()];
    for row in rows {
        for (slot, el) in row.into_iter().enumerate() {
            columns[slot].push(el.data);
        }
    }
    output_types
        .iter()
        .zip(columns)
        .map(|(dt, parts)| -> Result<TypedPayload> { Ok(TypedPayload::concat(*dt, parts)?) })
        .collect()
}

// ============================================================
// Per-frame
// ============================================================

/// Processes each job chunk as it arrives. Keeps no state; `finish`
/// closes the key's output with `data_finish`.
pub struct PerFrameHandler {
    transform: Box<dyn Transform>,
}

impl PerFrameHandler {
    pub fn new(transform: Box<dyn Transform>) -> Self {
        Self { transform }
    }
}

impl JobHandler for PerFrameHandler {
    fn call(
        &mut self,
        desc: JobDescriptor,
        inputs: Vec<Option<TypedPayload>>,
        out: &mut dyn OutputSink,
    ) -> Result<WorkerState> {
        if desc.kind == JobKind::Finish {
            // The orchestrator closes its output builders on data_finish.
            out.emit_data_finish(&desc.key, &desc.key)?;
            return Ok(None);
        }

        let inputs: Vec<TypedPayload> = inputs.into_iter().flatten().collect();
        let output_types = out.output_types().to_vec();
        let outputs = map_elements(self.transform.as_mut(), &inputs, &output_types)?;
        debug!(key = %desc.key, elements = inputs.first().map(TypedPayload::len).unwrap_or(0), "per-frame job");

        out.emit_data(&desc.key, &desc.key, &outputs)?;
        Ok(desc.state)
    }
}

// ============================================================
// Accumulate
// ============================================================

/// Chunks received so far for one key, per input slot.
#[derive(Debug, Default)]
struct Accumulated {
    slots: Vec<Vec<TypedPayload>>,
}

/// Buffers every chunk of a key and runs the transform once, over the
/// concatenated inputs, when the key finishes.
pub struct AccumulateHandler {
    transform: Box<dyn Transform>,
    input_types: Vec<DataType>,
}

impl AccumulateHandler {
    pub fn new(transform: Box<dyn Transform>, input_types: Vec<DataType>) -> Self {
        Self { transform, input_types }
    }

    fn take_state(desc: &mut JobDescriptor) -> Result<Option<Accumulated>> {
        match desc.state.take() {
            None => Ok(None),
            Some(state) => state
                .downcast::<Accumulated>()
                .map(|acc| Some(*acc))
                .map_err(|_| WorkerError::ProtocolViolation(format!("key {:?} carries foreign state", desc.key))),
        }
    }
}

impl JobHandler for AccumulateHandler {
    fn call(
        &mut self,
        mut desc: JobDescriptor,
        inputs: Vec<Option<TypedPayload>>,
        out: &mut dyn OutputSink,
    ) -> Result<WorkerState> {
        let acc = Self::take_state(&mut desc)?;

        match desc.kind {
            JobKind::Job => {
                let mut acc = acc.unwrap_or_else(|| Accumulated {
                    slots: vec![Vec::new(); inputs.len()],
                });
                for (slot, payload) in inputs.into_iter().enumerate() {
                    if let (Some(list), Some(payload)) = (acc.slots.get_mut(slot), payload) {
                        list.push(payload);
                    }
                }
                Ok(Some(Box::new(acc)))
            }
            JobKind::Finish => {
                if let Some(acc) = acc {
                    let all_inputs = self
                        .input_types
                        .iter()
                        .zip(acc.slots)
                        .map(|(dt, parts)| -> Result<TypedPayload> { Ok(TypedPayload::concat(*dt, parts)?) })
                        .collect::<Result<Vec<_>>>()?;
                    let elements: Vec<Element> = all_inputs.into_iter().map(Element::from).collect();

                    let output_types = out.output_types().to_vec();
                    let outputs: Vec<TypedPayload> = self
                        .transform
                        .apply_checked(&elements, &output_types)?
                        .into_iter()
                        .map(|el| el.data)
                        .collect();
                    debug!(key = %desc.key, "accumulated transform ran");
                    out.emit_data(&desc.key, &desc.key, &outputs)?;
                }
                out.emit_data_finish(&desc.key, &desc.key)?;
                Ok(None)
            }
        }
    }
}
