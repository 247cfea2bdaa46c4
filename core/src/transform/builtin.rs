use crate::codec::{ArrayData, ArrayValues, TypedPayload};
use crate::transform::types::{Element, Transform, TransformError};

/// Passes every input element through unchanged.
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&mut self, inputs: &[Element]) -> Result<Vec<Element>, TransformError> {
        Ok(inputs.to_vec())
    }
}

/// Inverts uint8 pixel values (`255 - v`) of every array-typed input.
pub struct InvertTransform;

impl InvertTransform {
    fn invert(array: &ArrayData) -> Result<ArrayData, TransformError> {
        match &array.values {
            ArrayValues::U8(v) => Ok(ArrayData {
                values: ArrayValues::U8(v.iter().map(|x| !x).collect()),
                ..array.clone()
            }),
            _ => Err(TransformError::Failed(format!(
                "invert expects uint8 values, got {:?}",
                array.element_type()
            ))),
        }
    }
}

impl Transform for InvertTransform {
    fn name(&self) -> &str {
        "invert"
    }

    fn apply(&mut self, inputs: &[Element]) -> Result<Vec<Element>, TransformError> {
        inputs
            .iter()
            .map(|el| -> Result<Element, TransformError> {
                let data = match &el.data {
                    TypedPayload::Image(a) => TypedPayload::Image(Self::invert(a)?),
                    TypedPayload::Video(a) => TypedPayload::Video(Self::invert(a)?),
                    TypedPayload::Array(a) => TypedPayload::Array(Self::invert(a)?),
                    other => return Err(TransformError::Unsupported(other.data_type())),
                };
                Ok(Element::new(data, el.metadata.clone()))
            })
            .collect()
    }
}
