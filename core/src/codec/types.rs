use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Zero bytes at a length-prefix position: the peer closed the stream.
    #[error("end of stream")]
    EndOfStream,

    #[error("truncated stream: {0}")]
    TruncatedStream(String),

    #[error("unsupported data type: {0}")]
    UnsupportedType(String),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, CodecError::EndOfStream)
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Malformed(e.to_string())
    }
}

/// Payload tag declared per input/output slot in the meta packet.
///
/// Closed set: every codec and pipeline boundary matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Image,
    Video,
    Array,
    GeoImage,
    Shape,
    Detection,
    Int,
    Floats,
    /// Generic JSON fallback (`json`, `string`, `text`, `table`, `file`).
    Json,
}

impl DataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Image => "image",
            DataType::Video => "video",
            DataType::Array => "array",
            DataType::GeoImage => "geoimage",
            DataType::Shape => "shape",
            DataType::Detection => "detection",
            DataType::Int => "int",
            DataType::Floats => "floats",
            DataType::Json => "json",
        }
    }

    /// Transmitted as header frame + raw bytes rather than a single JSON frame.
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            DataType::Image | DataType::Video | DataType::Array | DataType::GeoImage
        )
    }

    /// Fixed RGB/uint8 layout.
    pub const fn is_image_like(self) -> bool {
        matches!(self, DataType::Image | DataType::Video)
    }
}

impl FromStr for DataType {
    type Err = CodecError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "image" => Ok(DataType::Image),
            "video" => Ok(DataType::Video),
            "array" => Ok(DataType::Array),
            "geoimage" => Ok(DataType::GeoImage),
            "shape" => Ok(DataType::Shape),
            "detection" => Ok(DataType::Detection),
            "int" => Ok(DataType::Int),
            "floats" => Ok(DataType::Floats),
            "json" | "geojson" | "string" | "text" | "table" | "file" => Ok(DataType::Json),
            other => Err(CodecError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Primitive element type of an array payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl ElementType {
    /// Bytes per primitive.
    pub const fn size(self) -> usize {
        match self {
            ElementType::Uint8 | ElementType::Int8 => 1,
            ElementType::Uint16 | ElementType::Int16 => 2,
            ElementType::Uint32 | ElementType::Int32 | ElementType::Float32 => 4,
            ElementType::Uint64 | ElementType::Int64 | ElementType::Float64 => 8,
        }
    }
}

/// Header frame preceding the raw bytes of an array-typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArrayHeader {
    pub length: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub element_type: ElementType,
    pub bytes_per_element: u64,
    /// Only set for geoimage payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ArrayHeader {
    /// Bytes one element should occupy given the declared dimensions.
    pub fn expected_bytes_per_element(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.channels as u64 * self.element_type.size() as u64
    }

    /// Validate the header and return the number of raw bytes that follow it.
    pub fn body_len(&self) -> Result<usize, CodecError> {
        if self.length == 0 {
            return Ok(0);
        }

        let expected = self.expected_bytes_per_element();
        if self.bytes_per_element != expected {
            return Err(CodecError::Malformed(format!(
                "BytesPerElement {} does not match {}x{}x{} {:?} ({} bytes)",
                self.bytes_per_element, self.width, self.height, self.channels, self.element_type, expected
            )));
        }

        self.length
            .checked_mul(self.bytes_per_element)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CodecError::Malformed(format!("array of {} elements is too large", self.length)))
    }
}
