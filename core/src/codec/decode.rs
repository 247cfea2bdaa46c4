use std::io::Read;

use serde_json::Value;

use crate::codec::frame::{read_exact_or_truncated, read_frame};
use crate::codec::payload::{
    ArrayData, ArrayValues, DetectionData, DetectionWire, GeoImageData, ShapeData, ShapeWire, TypedPayload,
};
use crate::codec::types::{ArrayHeader, CodecError, DataType, ElementType};
use crate::constants::IMAGE_CHANNELS;

/// Read one payload of the declared type.
pub fn read_payload<R: Read + ?Sized>(r: &mut R, data_type: DataType) -> Result<TypedPayload, CodecError> {
    Ok(match data_type {
        DataType::Image => TypedPayload::Image(read_image(r)?),
        DataType::Video => TypedPayload::Video(read_image(r)?),
        DataType::Array => TypedPayload::Array(read_array(r)?.0),
        DataType::GeoImage => {
            let (image, metadata) = read_array(r)?;
            TypedPayload::GeoImage(GeoImageData {
                metadata: metadata.unwrap_or(Value::Null),
                image,
            })
        }
        DataType::Shape => TypedPayload::Shape(ShapeData::try_from(read_frame::<_, ShapeWire>(r)?)?),
        DataType::Detection => {
            TypedPayload::Detection(DetectionData::try_from(read_frame::<_, DetectionWire>(r)?)?)
        }
        DataType::Int => TypedPayload::Int(read_frame(r)?),
        DataType::Floats => TypedPayload::Floats(read_frame(r)?),
        DataType::Json => TypedPayload::Json(read_frame(r)?),
    })
}

/// Read one payload per declared slot.
///
/// `EndOfStream` is only reported before the first slot; running dry
/// between slots is a truncated chunk.
pub fn read_slots<R: Read + ?Sized>(r: &mut R, types: &[DataType]) -> Result<Vec<TypedPayload>, CodecError> {
    let mut out = Vec::with_capacity(types.len());
    for (i, dt) in types.iter().enumerate() {
        match read_payload(r, *dt) {
            Ok(p) => out.push(p),
            Err(CodecError::EndOfStream) if i > 0 => {
                return Err(CodecError::TruncatedStream(format!(
                    "stream ended after {} of {} slots",
                    i,
                    types.len()
                )))
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn read_image<R: Read + ?Sized>(r: &mut R) -> Result<ArrayData, CodecError> {
    let (array, _) = read_array(r)?;
    if array.length > 0 && array.channels != IMAGE_CHANNELS {
        return Err(CodecError::Malformed(format!(
            "image payloads have {} channels, got {}",
            IMAGE_CHANNELS, array.channels
        )));
    }
    Ok(array.cast(ElementType::Uint8))
}

fn read_array<R: Read + ?Sized>(r: &mut R) -> Result<(ArrayData, Option<Value>), CodecError> {
    let header: ArrayHeader = read_frame(r)?;
    let body_len = header.body_len()?;

    if header.length == 0 {
        let empty = ArrayData {
            length: 0,
            width: header.width,
            height: header.height,
            channels: header.channels,
            values: ArrayValues::empty(header.element_type),
        };
        return Ok((empty, header.metadata));
    }

    let raw = read_exact_or_truncated(r, body_len)?;
    let values = ArrayValues::from_be_bytes(header.element_type, &raw)?;
    let length = usize::try_from(header.length)
        .map_err(|_| CodecError::Malformed(format!("array of {} elements is too large", header.length)))?;
    let array = ArrayData::new(length, header.width, header.height, header.channels, values)?;
    Ok((array, header.metadata))
}
