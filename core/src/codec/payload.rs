use std::collections::BTreeMap;
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::types::{CodecError, DataType, ElementType};
use crate::constants::IMAGE_CHANNELS;

// ============================================================
// Array values
// ============================================================

/// Flat row-major primitive buffer, one variant per `ElementType`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Evaluate `$body` with `$v` bound to the inner vector, whatever the variant.
macro_rules! with_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ArrayValues::U8($v) => $body,
            ArrayValues::U16($v) => $body,
            ArrayValues::U32($v) => $body,
            ArrayValues::U64($v) => $body,
            ArrayValues::I8($v) => $body,
            ArrayValues::I16($v) => $body,
            ArrayValues::I32($v) => $body,
            ArrayValues::I64($v) => $body,
            ArrayValues::F32($v) => $body,
            ArrayValues::F64($v) => $body,
        }
    };
}

/// Same as `with_values!`, re-wrapping the result in the original variant.
macro_rules! map_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ArrayValues::U8($v) => ArrayValues::U8($body),
            ArrayValues::U16($v) => ArrayValues::U16($body),
            ArrayValues::U32($v) => ArrayValues::U32($body),
            ArrayValues::U64($v) => ArrayValues::U64($body),
            ArrayValues::I8($v) => ArrayValues::I8($body),
            ArrayValues::I16($v) => ArrayValues::I16($body),
            ArrayValues::I32($v) => ArrayValues::I32($body),
            ArrayValues::I64($v) => ArrayValues::I64($body),
            ArrayValues::F32($v) => ArrayValues::F32($body),
            ArrayValues::F64($v) => ArrayValues::F64($body),
        }
    };
}

/// `as`-cast every primitive into `$ty`.
macro_rules! cast_values {
    ($values:expr, $ty:ty) => {
        with_values!($values, v => v.into_iter().map(|x| x as $ty).collect::<Vec<$ty>>())
    };
}

impl ArrayValues {
    pub fn empty(element_type: ElementType) -> Self {
        ArrayValues::U8(Vec::new()).cast(element_type)
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayValues::U8(_) => ElementType::Uint8,
            ArrayValues::U16(_) => ElementType::Uint16,
            ArrayValues::U32(_) => ElementType::Uint32,
            ArrayValues::U64(_) => ElementType::Uint64,
            ArrayValues::I8(_) => ElementType::Int8,
            ArrayValues::I16(_) => ElementType::Int16,
            ArrayValues::I32(_) => ElementType::Int32,
            ArrayValues::I64(_) => ElementType::Int64,
            ArrayValues::F32(_) => ElementType::Float32,
            ArrayValues::F64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coerce to `target`; a no-op when the type already matches.
    pub fn cast(self, target: ElementType) -> Self {
        if self.element_type() == target {
            return self;
        }
        match target {
            ElementType::Uint8 => ArrayValues::U8(cast_values!(self, u8)),
            ElementType::Uint16 => ArrayValues::U16(cast_values!(self, u16)),
            ElementType::Uint32 => ArrayValues::U32(cast_values!(self, u32)),
            ElementType::Uint64 => ArrayValues::U64(cast_values!(self, u64)),
            ElementType::Int8 => ArrayValues::I8(cast_values!(self, i8)),
            ElementType::Int16 => ArrayValues::I16(cast_values!(self, i16)),
            ElementType::Int32 => ArrayValues::I32(cast_values!(self, i32)),
            ElementType::Int64 => ArrayValues::I64(cast_values!(self, i64)),
            ElementType::Float32 => ArrayValues::F32(cast_values!(self, f32)),
            ElementType::Float64 => ArrayValues::F64(cast_values!(self, f64)),
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        map_values!(self, v => v[range.clone()].to_vec())
    }

    /// Append `other`, which is first coerced to this buffer's element type.
    pub fn extend(&mut self, other: ArrayValues) {
        let other = other.cast(self.element_type());
        match (self, other) {
            (ArrayValues::U8(a), ArrayValues::U8(b)) => a.extend(b),
            (ArrayValues::U16(a), ArrayValues::U16(b)) => a.extend(b),
            (ArrayValues::U32(a), ArrayValues::U32(b)) => a.extend(b),
            (ArrayValues::U64(a), ArrayValues::U64(b)) => a.extend(b),
            (ArrayValues::I8(a), ArrayValues::I8(b)) => a.extend(b),
            (ArrayValues::I16(a), ArrayValues::I16(b)) => a.extend(b),
            (ArrayValues::I32(a), ArrayValues::I32(b)) => a.extend(b),
            (ArrayValues::I64(a), ArrayValues::I64(b)) => a.extend(b),
            (ArrayValues::F32(a), ArrayValues::F32(b)) => a.extend(b),
            (ArrayValues::F64(a), ArrayValues::F64(b)) => a.extend(b),
            _ => unreachable!("cast yields the target element type"),
        }
    }

    /// Big-endian wire bytes.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len() * self.element_type().size()];
        match self {
            ArrayValues::U8(v) => out.copy_from_slice(v),
            ArrayValues::I8(v) => {
                for (dst, x) in out.iter_mut().zip(v) {
                    *dst = *x as u8;
                }
            }
            ArrayValues::U16(v) => BigEndian::write_u16_into(v, &mut out),
            ArrayValues::U32(v) => BigEndian::write_u32_into(v, &mut out),
            ArrayValues::U64(v) => BigEndian::write_u64_into(v, &mut out),
            ArrayValues::I16(v) => BigEndian::write_i16_into(v, &mut out),
            ArrayValues::I32(v) => BigEndian::write_i32_into(v, &mut out),
            ArrayValues::I64(v) => BigEndian::write_i64_into(v, &mut out),
            ArrayValues::F32(v) => BigEndian::write_f32_into(v, &mut out),
            ArrayValues::F64(v) => BigEndian::write_f64_into(v, &mut out),
        }
        out
    }

    /// Inverse of `to_be_bytes`. `bytes.len()` must be a multiple of the element size.
    pub fn from_be_bytes(element_type: ElementType, bytes: &[u8]) -> Result<Self, CodecError> {
        let size = element_type.size();
        if bytes.len() % size != 0 {
            return Err(CodecError::Malformed(format!(
                "{} raw bytes is not a multiple of {:?} ({} bytes)",
                bytes.len(),
                element_type,
                size
            )));
        }
        let n = bytes.len() / size;

        Ok(match element_type {
            ElementType::Uint8 => ArrayValues::U8(bytes.to_vec()),
            ElementType::Int8 => ArrayValues::I8(bytes.iter().map(|b| *b as i8).collect()),
            ElementType::Uint16 => {
                let mut v = vec![0u16; n];
                BigEndian::read_u16_into(bytes, &mut v);
                ArrayValues::U16(v)
            }
            ElementType::Uint32 => {
                let mut v = vec![0u32; n];
                BigEndian::read_u32_into(bytes, &mut v);
                ArrayValues::U32(v)
            }
            ElementType::Uint64 => {
                let mut v = vec![0u64; n];
                BigEndian::read_u64_into(bytes, &mut v);
                ArrayValues::U64(v)
            }
            ElementType::Int16 => {
                let mut v = vec![0i16; n];
                BigEndian::read_i16_into(bytes, &mut v);
                ArrayValues::I16(v)
            }
            ElementType::Int32 => {
                let mut v = vec![0i32; n];
                BigEndian::read_i32_into(bytes, &mut v);
                ArrayValues::I32(v)
            }
            ElementType::Int64 => {
                let mut v = vec![0i64; n];
                BigEndian::read_i64_into(bytes, &mut v);
                ArrayValues::I64(v)
            }
            ElementType::Float32 => {
                let mut v = vec![0f32; n];
                BigEndian::read_f32_into(bytes, &mut v);
                ArrayValues::F32(v)
            }
            ElementType::Float64 => {
                let mut v = vec![0f64; n];
                BigEndian::read_f64_into(bytes, &mut v);
                ArrayValues::F64(v)
            }
        })
    }
}

// ============================================================
// Array data
// ============================================================

/// A chunk of `length` equally shaped elements (frames, tensors).
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    pub length: usize,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub values: ArrayValues,
}

impl ArrayData {
    /// Build a chunk, checking that `values` holds exactly `length` elements.
    pub fn new(
        length: usize,
        width: u32,
        height: u32,
        channels: u32,
        values: ArrayValues,
    ) -> Result<Self, CodecError> {
        let data = Self { length, width, height, channels, values };
        let expected = data.item_len() * length;
        if data.values.len() != expected {
            return Err(CodecError::Malformed(format!(
                "{} values cannot form {} elements of {}x{}x{}",
                data.values.len(),
                length,
                width,
                height,
                channels
            )));
        }
        Ok(data)
    }

    /// RGB uint8 frames.
    pub fn image(length: usize, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CodecError> {
        Self::new(length, width, height, IMAGE_CHANNELS, ArrayValues::U8(pixels))
    }

    /// Zero-length chunk of the given element type.
    pub fn empty(element_type: ElementType) -> Self {
        Self {
            length: 0,
            width: 0,
            height: 0,
            channels: 0,
            values: ArrayValues::empty(element_type),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.values.element_type()
    }

    /// Primitives per element.
    pub fn item_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn bytes_per_element(&self) -> usize {
        self.item_len() * self.element_type().size()
    }

    pub fn dims(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.channels)
    }

    pub fn cast(self, element_type: ElementType) -> Self {
        Self { values: self.values.cast(element_type), ..self }
    }

    pub fn slice(&self, i: usize) -> Result<Self, CodecError> {
        check_index(i, self.length)?;
        let n = self.item_len();
        Ok(Self {
            length: 1,
            width: self.width,
            height: self.height,
            channels: self.channels,
            values: self.values.slice(i * n..(i + 1) * n),
        })
    }

    /// Stack chunks along the element axis. Empty chunks are skipped;
    /// the rest must agree on dimensions.
    pub fn concat(parts: Vec<ArrayData>) -> Result<Self, CodecError> {
        let mut out: Option<ArrayData> = None;
        for part in parts {
            if part.length == 0 {
                if out.is_none() {
                    out = Some(part);
                }
                continue;
            }
            match out.as_mut() {
                Some(acc) if acc.length > 0 => {
                    if acc.dims() != part.dims() {
                        return Err(CodecError::Malformed(format!(
                            "cannot stack {:?} elements onto {:?}",
                            part.dims(),
                            acc.dims()
                        )));
                    }
                    acc.length += part.length;
                    acc.values.extend(part.values);
                }
                _ => out = Some(part),
            }
        }
        Ok(out.unwrap_or_else(|| ArrayData::empty(ElementType::Uint8)))
    }
}

/// Single georeferenced raster plus its free-form metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoImageData {
    pub metadata: Value,
    pub image: ArrayData,
}

// ============================================================
// Structured payloads
// ============================================================

/// Canvas and category information shared by shape/detection chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpatialMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_dims: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Point,
    Line,
    Polyline,
    Box,
    Polygon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Shape {
    #[serde(rename = "Type")]
    pub kind: ShapeKind,
    pub points: Vec<[i32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "TrackID", default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detection {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "TrackID", default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// One list of shapes per element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeData {
    pub shapes: Vec<Vec<Shape>>,
    pub metadata: SpatialMetadata,
}

/// One list of detections per element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionData {
    pub detections: Vec<Vec<Detection>>,
    pub metadata: SpatialMetadata,
}

/// Flattened wire form: `Counts[i]` entries of `Points` belong to element `i`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ShapeWire {
    pub counts: Vec<usize>,
    pub points: Vec<Shape>,
    #[serde(flatten)]
    pub metadata: SpatialMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DetectionWire {
    pub counts: Vec<usize>,
    pub detections: Vec<Detection>,
    #[serde(flatten)]
    pub metadata: SpatialMetadata,
}

fn flatten_nested<T>(nested: Vec<Vec<T>>) -> (Vec<usize>, Vec<T>) {
    let counts = nested.iter().map(Vec::len).collect();
    (counts, nested.into_iter().flatten().collect())
}

fn unflatten_nested<T>(counts: &[usize], flat: Vec<T>) -> Result<Vec<Vec<T>>, CodecError> {
    let total: usize = counts.iter().sum();
    if total != flat.len() {
        return Err(CodecError::Malformed(format!(
            "counts sum to {} but {} entries were sent",
            total,
            flat.len()
        )));
    }
    let mut it = flat.into_iter();
    Ok(counts.iter().map(|n| it.by_ref().take(*n).collect()).collect())
}

impl From<ShapeData> for ShapeWire {
    fn from(data: ShapeData) -> Self {
        let (counts, points) = flatten_nested(data.shapes);
        Self { counts, points, metadata: data.metadata }
    }
}

impl TryFrom<ShapeWire> for ShapeData {
    type Error = CodecError;

    fn try_from(wire: ShapeWire) -> Result<Self, Self::Error> {
        Ok(Self {
            shapes: unflatten_nested(&wire.counts, wire.points)?,
            metadata: wire.metadata,
        })
    }
}

impl From<DetectionData> for DetectionWire {
    fn from(data: DetectionData) -> Self {
        let (counts, detections) = flatten_nested(data.detections);
        Self { counts, detections, metadata: data.metadata }
    }
}

impl TryFrom<DetectionWire> for DetectionData {
    type Error = CodecError;

    fn try_from(wire: DetectionWire) -> Result<Self, Self::Error> {
        Ok(Self {
            detections: unflatten_nested(&wire.counts, wire.detections)?,
            metadata: wire.metadata,
        })
    }
}

// ============================================================
// Typed payload
// ============================================================

/// One chunk of elements for a single input/output slot.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedPayload {
    Image(ArrayData),
    Video(ArrayData),
    Array(ArrayData),
    GeoImage(GeoImageData),
    Shape(ShapeData),
    Detection(DetectionData),
    Int(Vec<i64>),
    Floats(Vec<Vec<f64>>),
    Json(Vec<Value>),
}

impl TypedPayload {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedPayload::Image(_) => DataType::Image,
            TypedPayload::Video(_) => DataType::Video,
            TypedPayload::Array(_) => DataType::Array,
            TypedPayload::GeoImage(_) => DataType::GeoImage,
            TypedPayload::Shape(_) => DataType::Shape,
            TypedPayload::Detection(_) => DataType::Detection,
            TypedPayload::Int(_) => DataType::Int,
            TypedPayload::Floats(_) => DataType::Floats,
            TypedPayload::Json(_) => DataType::Json,
        }
    }

    /// Zero-element chunk for `data_type`.
    pub fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Image => TypedPayload::Image(ArrayData::empty(ElementType::Uint8)),
            DataType::Video => TypedPayload::Video(ArrayData::empty(ElementType::Uint8)),
            DataType::Array => TypedPayload::Array(ArrayData::empty(ElementType::Uint8)),
            DataType::GeoImage => TypedPayload::GeoImage(GeoImageData {
                metadata: Value::Null,
                image: ArrayData::empty(ElementType::Uint8),
            }),
            DataType::Shape => TypedPayload::Shape(ShapeData::default()),
            DataType::Detection => TypedPayload::Detection(DetectionData::default()),
            DataType::Int => TypedPayload::Int(Vec::new()),
            DataType::Floats => TypedPayload::Floats(Vec::new()),
            DataType::Json => TypedPayload::Json(Vec::new()),
        }
    }

    /// Number of elements in the chunk. A geoimage is a single element.
    pub fn len(&self) -> usize {
        match self {
            TypedPayload::Image(a) | TypedPayload::Video(a) | TypedPayload::Array(a) => a.length,
            TypedPayload::GeoImage(g) => usize::from(g.image.length > 0),
            TypedPayload::Shape(s) => s.shapes.len(),
            TypedPayload::Detection(d) => d.detections.len(),
            TypedPayload::Int(v) => v.len(),
            TypedPayload::Floats(v) => v.len(),
            TypedPayload::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Single-element chunk holding element `i`.
    pub fn slice(&self, i: usize) -> Result<Self, CodecError> {
        check_index(i, self.len())?;
        Ok(match self {
            TypedPayload::Image(a) => TypedPayload::Image(a.slice(i)?),
            TypedPayload::Video(a) => TypedPayload::Video(a.slice(i)?),
            TypedPayload::Array(a) => TypedPayload::Array(a.slice(i)?),
            TypedPayload::GeoImage(g) => TypedPayload::GeoImage(g.clone()),
            TypedPayload::Shape(s) => TypedPayload::Shape(ShapeData {
                shapes: vec![s.shapes[i].clone()],
                metadata: s.metadata.clone(),
            }),
            TypedPayload::Detection(d) => TypedPayload::Detection(DetectionData {
                detections: vec![d.detections[i].clone()],
                metadata: d.metadata.clone(),
            }),
            TypedPayload::Int(v) => TypedPayload::Int(vec![v[i]]),
            TypedPayload::Floats(v) => TypedPayload::Floats(vec![v[i].clone()]),
            TypedPayload::Json(v) => TypedPayload::Json(vec![v[i].clone()]),
        })
    }

    /// Stack `parts` into one chunk of type `data_type`, preserving order.
    ///
    /// Structured chunks keep the metadata of the first part.
    pub fn concat(data_type: DataType, parts: Vec<TypedPayload>) -> Result<Self, CodecError> {
        if let Some(bad) = parts.iter().find(|p| p.data_type() != data_type) {
            return Err(CodecError::Malformed(format!(
                "cannot stack {} into {}",
                bad.data_type(),
                data_type
            )));
        }
        if parts.is_empty() {
            return Ok(Self::empty(data_type));
        }

        Ok(match data_type {
            DataType::Image | DataType::Video | DataType::Array => {
                let arrays = parts
                    .into_iter()
                    .filter_map(|p| match p {
                        TypedPayload::Image(a) | TypedPayload::Video(a) | TypedPayload::Array(a) => Some(a),
                        _ => None,
                    })
                    .collect();
                let stacked = ArrayData::concat(arrays)?;
                match data_type {
                    DataType::Image => TypedPayload::Image(stacked),
                    DataType::Video => TypedPayload::Video(stacked),
                    _ => TypedPayload::Array(stacked),
                }
            }
            DataType::GeoImage => {
                let mut geos: Vec<GeoImageData> = parts
                    .into_iter()
                    .filter_map(|p| match p {
                        TypedPayload::GeoImage(g) if g.image.length > 0 => Some(g),
                        _ => None,
                    })
                    .collect();
                match geos.len() {
                    0 => Self::empty(DataType::GeoImage),
                    1 => TypedPayload::GeoImage(geos.remove(0)),
                    n => {
                        return Err(CodecError::Malformed(format!(
                            "a geoimage chunk holds one raster, got {}",
                            n
                        )))
                    }
                }
            }
            DataType::Shape => {
                let mut out: Option<ShapeData> = None;
                for part in parts {
                    if let TypedPayload::Shape(s) = part {
                        match out.as_mut() {
                            Some(acc) => acc.shapes.extend(s.shapes),
                            None => out = Some(s),
                        }
                    }
                }
                TypedPayload::Shape(out.unwrap_or_default())
            }
            DataType::Detection => {
                let mut out: Option<DetectionData> = None;
                for part in parts {
                    if let TypedPayload::Detection(d) = part {
                        match out.as_mut() {
                            Some(acc) => acc.detections.extend(d.detections),
                            None => out = Some(d),
                        }
                    }
                }
                TypedPayload::Detection(out.unwrap_or_default())
            }
            DataType::Int => TypedPayload::Int(
                parts
                    .into_iter()
                    .flat_map(|p| match p {
                        TypedPayload::Int(v) => v,
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
            DataType::Floats => TypedPayload::Floats(
                parts
                    .into_iter()
                    .flat_map(|p| match p {
                        TypedPayload::Floats(v) => v,
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
            DataType::Json => TypedPayload::Json(
                parts
                    .into_iter()
                    .flat_map(|p| match p {
                        TypedPayload::Json(v) => v,
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
        })
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            TypedPayload::Image(a) | TypedPayload::Video(a) | TypedPayload::Array(a) => Some(a),
            TypedPayload::GeoImage(g) => Some(&g.image),
            _ => None,
        }
    }
}

fn check_index(i: usize, len: usize) -> Result<(), CodecError> {
    if i >= len {
        return Err(CodecError::Malformed(format!("element {} out of range for chunk of {}", i, len)));
    }
    Ok(())
}
