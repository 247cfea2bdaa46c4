use serde_json::Value;
use thiserror::Error;

use crate::codec::{CodecError, DataType, TypedPayload};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform failed: {0}")]
    Failed(String),

    #[error("transform produced {actual} outputs, expected {expected}")]
    Arity { expected: usize, actual: usize },

    #[error("transform does not handle {0} payloads")]
    Unsupported(DataType),
}

impl From<CodecError> for TransformError {
    fn from(e: CodecError) -> Self {
        TransformError::Failed(e.to_string())
    }
}

/// One element of one slot: a single-element payload chunk plus free-form metadata
/// (categories, canvas dims, ...) that ends up in the output dataset's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub data: TypedPayload,
    pub metadata: Value,
}

impl Element {
    pub fn new(data: TypedPayload, metadata: Value) -> Self {
        Self { data, metadata }
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }
}

impl From<TypedPayload> for Element {
    fn from(data: TypedPayload) -> Self {
        Self { data, metadata: Value::Null }
    }
}

/// User-supplied computation.
///
/// Receives one element per input slot, returns one element per output slot.
/// `&mut self` lets a transform hold a non-reentrant resource (model handle,
/// accelerator context); the runtime never calls it concurrently.
pub trait Transform {
    fn name(&self) -> &str;

    fn apply(&mut self, inputs: &[Element]) -> Result<Vec<Element>, TransformError>;

    /// Apply and check the output arity against the declared output slots.
    fn apply_checked(&mut self, inputs: &[Element], outputs: &[DataType]) -> Result<Vec<Element>, TransformError> {
        let out = self.apply(inputs)?;
        if out.len() != outputs.len() {
            return Err(TransformError::Arity { expected: outputs.len(), actual: out.len() });
        }
        Ok(out)
    }
}
