//! Wire codec for the worker stream.
//!
//! Responsibilities:
//! - Length-prefixed JSON frames (4-byte big-endian length + UTF-8 JSON)
//! - Typed payloads: array types as header frame + raw big-endian bytes,
//!   everything else as a single JSON frame
//! - Strict validation on decode
//!
//! Non-responsibilities:
//! - Job lifecycle
//! - IO setup
//! - Parallelism

pub mod types;
pub mod frame;
pub mod payload;
pub mod encode;
pub mod decode;

pub use types::{
    ArrayHeader,
    CodecError,
    DataType,
    ElementType,
};
pub use frame::{
    encode_frame,
    read_frame,
    write_frame,
};
pub use payload::{
    ArrayData,
    ArrayValues,
    Detection,
    DetectionData,
    GeoImageData,
    Shape,
    ShapeData,
    ShapeKind,
    SpatialMetadata,
    TypedPayload,
};
pub use encode::{encode_slots, write_payload, write_slots};
pub use decode::{read_payload, read_slots};
