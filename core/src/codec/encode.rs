use std::borrow::Cow;
use std::io::Write;

use crate::codec::frame::write_frame;
use crate::codec::payload::{ArrayData, DetectionWire, ShapeWire, TypedPayload};
use crate::codec::types::{ArrayHeader, CodecError, DataType, ElementType};
use crate::constants::IMAGE_CHANNELS;

/// Write one payload: header frame + raw bytes for array types,
/// a single JSON frame otherwise.
pub fn write_payload<W: Write + ?Sized>(w: &mut W, payload: &TypedPayload) -> Result<(), CodecError> {
    match payload {
        TypedPayload::Image(a) | TypedPayload::Video(a) => {
            let layout = image_layout(a)?;
            write_array(w, &layout, None)
        }
        TypedPayload::Array(a) => write_array(w, a, None),
        TypedPayload::GeoImage(g) => write_array(w, &g.image, Some(&g.metadata)),
        TypedPayload::Shape(s) => write_frame(w, &ShapeWire::from(s.clone())),
        TypedPayload::Detection(d) => write_frame(w, &DetectionWire::from(d.clone())),
        TypedPayload::Int(v) => write_frame(w, v),
        TypedPayload::Floats(v) => write_frame(w, v),
        TypedPayload::Json(v) => write_frame(w, v),
    }
}

/// Write one payload per declared slot, in slot order.
pub fn write_slots<W: Write + ?Sized>(
    w: &mut W,
    types: &[DataType],
    payloads: &[TypedPayload],
) -> Result<(), CodecError> {
    check_slots(types, payloads)?;
    for payload in payloads {
        write_payload(w, payload)?;
    }
    Ok(())
}

/// `write_slots` into a fresh buffer (one HTTP body chunk).
pub fn encode_slots(types: &[DataType], payloads: &[TypedPayload]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    write_slots(&mut out, types, payloads)?;
    Ok(out)
}

fn check_slots(types: &[DataType], payloads: &[TypedPayload]) -> Result<(), CodecError> {
    if types.len() != payloads.len() {
        return Err(CodecError::Malformed(format!(
            "{} slots declared but {} payloads given",
            types.len(),
            payloads.len()
        )));
    }
    for (i, (dt, payload)) in types.iter().zip(payloads).enumerate() {
        if payload.data_type() != *dt {
            return Err(CodecError::Malformed(format!(
                "slot {} is declared {} but holds {}",
                i,
                dt,
                payload.data_type()
            )));
        }
    }
    Ok(())
}

/// Image/video chunks are always RGB uint8.
fn image_layout(array: &ArrayData) -> Result<Cow<'_, ArrayData>, CodecError> {
    if array.length > 0 && array.channels != IMAGE_CHANNELS {
        return Err(CodecError::Malformed(format!(
            "image payloads have {} channels, got {}",
            IMAGE_CHANNELS, array.channels
        )));
    }
    if array.element_type() == ElementType::Uint8 {
        return Ok(Cow::Borrowed(array));
    }
    Ok(Cow::Owned(array.clone().cast(ElementType::Uint8)))
}

fn write_array<W: Write + ?Sized>(
    w: &mut W,
    array: &ArrayData,
    metadata: Option<&serde_json::Value>,
) -> Result<(), CodecError> {
    let header = ArrayHeader {
        length: array.length as u64,
        width: array.width,
        height: array.height,
        channels: array.channels,
        element_type: array.element_type(),
        bytes_per_element: if array.length == 0 { 0 } else { array.bytes_per_element() as u64 },
        metadata: metadata.cloned(),
    };
    write_frame(w, &header)?;

    if array.length > 0 {
        w.write_all(&array.values.to_be_bytes())?;
    }
    Ok(())
}
