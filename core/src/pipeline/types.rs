use serde_json::{Map, Value};

use crate::codec::{DataType, TypedPayload};
use crate::operator::{RequestId, Task};
use crate::transform::Element;

/// Lane index shared by one ingress/egress pair.
pub type WorkerId = usize;

/// Unit of work handed to the ingress side.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineJob {
    pub request_id: RequestId,
    pub task: Task,
}

/// Output settings derived from a task's first input chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDefaults {
    /// `[width, height]` of the first image-like input.
    pub canvas_dims: Option<[u32; 2]>,
    /// `Framerate` from the first input item metadata that has one.
    pub framerate: Option<Value>,
}

impl OutputDefaults {
    pub fn derive(inputs: &[TypedPayload], item_metadata: &[Value]) -> Self {
        let canvas_dims = inputs.iter().find_map(|p| match p {
            TypedPayload::Image(a) | TypedPayload::Video(a) if a.length > 0 => Some([a.width, a.height]),
            _ => None,
        });
        let framerate = item_metadata.iter().find_map(|m| m.get("Framerate").cloned());
        Self { canvas_dims, framerate }
    }

    /// Fill dataset metadata the transform left unset.
    pub fn decorate(&self, data_type: DataType, metadata: Value) -> Value {
        let mut obj = match metadata {
            Value::Object(obj) => obj,
            Value::Null => Map::new(),
            other => return other,
        };

        match data_type {
            DataType::Shape | DataType::Detection => {
                if let Some(dims) = self.canvas_dims {
                    obj.entry("CanvasDims").or_insert_with(|| Value::from(dims.to_vec()));
                }
            }
            DataType::Video => {
                if let Some(dims) = self.canvas_dims {
                    obj.entry("Dims").or_insert_with(|| Value::from(dims.to_vec()));
                }
                if let Some(rate) = &self.framerate {
                    obj.entry("Framerate").or_insert_with(|| rate.clone());
                }
            }
            _ => {}
        }
        Value::Object(obj)
    }

    /// Set canvas dims on structured payloads that carry none.
    pub fn fill_payload(&self, payload: &mut TypedPayload) {
        let Some(dims) = self.canvas_dims else { return };
        match payload {
            TypedPayload::Shape(s) if s.metadata.canvas_dims.is_none() => s.metadata.canvas_dims = Some(dims),
            TypedPayload::Detection(d) if d.metadata.canvas_dims.is_none() => d.metadata.canvas_dims = Some(dims),
            _ => {}
        }
    }
}

/// Ingress → compute. All lanes share one queue.
#[derive(Debug)]
pub enum ComputeMessage {
    Init {
        worker_id: WorkerId,
        request_id: RequestId,
        task: Task,
        defaults: OutputDefaults,
    },
    /// One row per element, one element per input slot.
    Infer { worker_id: WorkerId, rows: Vec<Vec<Element>> },
    Close { worker_id: WorkerId },
}

impl ComputeMessage {
    pub fn worker_id(&self) -> WorkerId {
        match self {
            ComputeMessage::Init { worker_id, .. }
            | ComputeMessage::Infer { worker_id, .. }
            | ComputeMessage::Close { worker_id } => *worker_id,
        }
    }
}

/// Compute → egress, on the lane's own queue.
#[derive(Debug)]
pub enum EgressMessage {
    Init {
        request_id: RequestId,
        task: Task,
        defaults: OutputDefaults,
    },
    /// One row per element, one element per output slot.
    Result { rows: Vec<Vec<Element>> },
    Close,
}
