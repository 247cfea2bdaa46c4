// Shared fixtures for the integration tests: an in-memory collaborator,
// a shared sideband buffer and small payload builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender};
use serde_json::Value;

use skyhook_core::codec::{self, ArrayData, DataType, TypedPayload};
use skyhook_core::collaborator::{ChunkStream, Collaborator};
use skyhook_core::operator::{Item, RawItems, INPUTS_GROUP};
use skyhook_core::transform::{Element, Transform, TransformError};
use skyhook_core::types::{Result, WorkerError};

// ------------------------------------------------------------
// Collaborator
// ------------------------------------------------------------

/// One completed `/build` call.
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub key: String,
    pub metas: Value,
    /// Chunks after the metas frame.
    pub chunks: Vec<Bytes>,
}

impl BuildRecord {
    /// Decode every data chunk as one payload per output slot.
    pub fn payloads(&self, types: &[DataType]) -> Vec<Vec<TypedPayload>> {
        self.chunks
            .iter()
            .map(|c| codec::read_slots(&mut Cursor::new(c.to_vec()), types).unwrap())
            .collect()
    }
}

/// Collaborator backed by in-memory maps.
///
/// `/synchronized-reader` serves the stream registered under the key of
/// the first item; `/load-data` serves the payload registered per item key.
/// A latched key's reader stream holds at end of data until the latch opens.
#[derive(Default)]
pub struct MemoryCollaborator {
    streams: HashMap<String, Vec<u8>>,
    items: HashMap<String, Vec<u8>>,
    datasets: HashMap<i64, Vec<Item>>,
    config: Value,
    latch: Option<(String, Receiver<()>)>,
    pub builds: Mutex<Vec<BuildRecord>>,
    pub writes: Mutex<Vec<Vec<u8>>>,
}

impl MemoryCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.streams.insert(key.to_string(), bytes);
        self
    }

    pub fn with_item(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.items.insert(key.to_string(), bytes);
        self
    }

    pub fn with_dataset(mut self, id: i64, items: Vec<Item>) -> Self {
        self.datasets.insert(id, items);
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Hold the end of `key`'s reader stream until the returned sender
    /// sends or drops.
    pub fn with_reader_latch(mut self, key: &str) -> (Self, Sender<()>) {
        let (tx, rx) = bounded(1);
        self.latch = Some((key.to_string(), rx));
        (self, tx)
    }

    pub fn has_build(&self, key: &str) -> bool {
        self.builds.lock().unwrap().iter().any(|b| b.key == key)
    }

    pub fn builds(&self) -> Vec<BuildRecord> {
        self.builds.lock().unwrap().clone()
    }

    pub fn build_for(&self, key: &str) -> BuildRecord {
        self.builds()
            .into_iter()
            .find(|b| b.key == key)
            .unwrap_or_else(|| panic!("no build for {}", key))
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }
}

impl Collaborator for MemoryCollaborator {
    fn synchronized_reader(&self, items: &[Item]) -> Result<Box<dyn Read + Send>> {
        let key = items.first().map(|i| i.key.clone()).unwrap_or_default();
        let bytes = self.streams.get(&key).cloned().unwrap_or_default();
        let latch = self.latch.as_ref().filter(|(k, _)| *k == key).map(|(_, rx)| rx.clone());
        Ok(Box::new(LatchedReader { inner: Cursor::new(bytes), latch }))
    }

    fn build(&self, body: ChunkStream) -> Result<()> {
        let mut chunks = Vec::new();
        for chunk in body {
            chunks.push(chunk?);
        }
        if chunks.is_empty() {
            return Err(WorkerError::Collaborator("empty build body".to_string()));
        }
        let first = chunks.remove(0);
        let metas: Value = codec::read_frame(&mut Cursor::new(first.to_vec()))?;
        let key = metas[0]["Key"].as_str().unwrap_or_default().to_string();
        self.builds.lock().unwrap().push(BuildRecord { key, metas, chunks });
        Ok(())
    }

    fn load_data(&self, item: &Item) -> Result<Box<dyn Read + Send>> {
        let bytes = self
            .items
            .get(&item.key)
            .cloned()
            .ok_or_else(|| WorkerError::Collaborator(format!("no item {}", item.key)))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn write_item(&self, body: Vec<u8>) -> Result<()> {
        self.writes.lock().unwrap().push(body);
        Ok(())
    }

    fn config(&self) -> Result<Value> {
        Ok(self.config.clone())
    }

    fn dataset_items(&self, dataset_id: i64) -> Result<Vec<Item>> {
        self.datasets
            .get(&dataset_id)
            .cloned()
            .ok_or_else(|| WorkerError::Collaborator(format!("no dataset {}", dataset_id)))
    }
}

/// Serves `inner`, waiting once on `latch` when the data runs out.
struct LatchedReader {
    inner: Cursor<Vec<u8>>,
    latch: Option<Receiver<()>>,
}

impl Read for LatchedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            if let Some(rx) = self.latch.take() {
                let _ = rx.recv();
            }
        }
        Ok(n)
    }
}

// ------------------------------------------------------------
// Sideband output
// ------------------------------------------------------------

/// Clonable `Write` whose bytes stay inspectable after being moved
/// into a `SidebandWriter`.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap().lines().map(str::to_string).collect()
    }

    /// Parsed response bodies (the part after the `skjson` marker).
    pub fn responses(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .map(|l| serde_json::from_str(l.strip_prefix("skjson").unwrap()).unwrap())
            .collect()
    }

    /// Request ids of every response, in write order.
    pub fn acked_ids(&self) -> Vec<u64> {
        self.responses().iter().map(|r| r["RequestID"].as_u64().unwrap()).collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ------------------------------------------------------------
// Payload builders
// ------------------------------------------------------------

/// `n` RGB frames of `w`x`h`, frame `i` filled with `fill + i`.
pub fn image_chunk(n: usize, w: u32, h: u32, fill: u8) -> TypedPayload {
    let frame = (w * h * 3) as usize;
    let pixels = (0..n).flat_map(|i| vec![fill.wrapping_add(i as u8); frame]).collect();
    TypedPayload::Image(ArrayData::image(n, w, h, pixels).unwrap())
}

/// Same pixels as `image_chunk`, tagged as video frames.
pub fn video_chunk(n: usize, w: u32, h: u32, fill: u8) -> TypedPayload {
    match image_chunk(n, w, h, fill) {
        TypedPayload::Image(a) => TypedPayload::Video(a),
        other => other,
    }
}

/// Encode chunks back to back, as `/synchronized-reader` would stream them.
pub fn encode_chunks(types: &[DataType], chunks: &[Vec<TypedPayload>]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(codec::encode_slots(types, chunk).unwrap());
    }
    out
}

pub fn item(key: &str) -> Item {
    Item::new(key)
}

pub fn item_with_metadata(key: &str, metadata: Value) -> Item {
    let mut it = Item::new(key);
    it.extra.insert("Metadata".to_string(), Value::String(metadata.to_string()));
    it
}

/// Raw listing with one list of keys per input slot.
pub fn raw_inputs(slots: &[&[&str]]) -> RawItems {
    let mut raw = RawItems::new();
    raw.insert(
        INPUTS_GROUP.to_string(),
        slots.iter().map(|keys| keys.iter().map(|k| item(k)).collect()).collect(),
    );
    raw
}

// ------------------------------------------------------------
// Transforms
// ------------------------------------------------------------

/// image → int: sum of the element's pixel bytes.
pub struct PixelSumTransform;

impl Transform for PixelSumTransform {
    fn name(&self) -> &str {
        "pixel_sum"
    }

    fn apply(&mut self, inputs: &[Element]) -> std::result::Result<Vec<Element>, TransformError> {
        let array = inputs[0]
            .data
            .as_array()
            .ok_or(TransformError::Unsupported(inputs[0].data_type()))?;
        let sum: i64 = array.values.to_be_bytes().iter().map(|b| i64::from(*b)).sum();
        Ok(vec![Element::new(TypedPayload::Int(vec![sum]), Value::Null)])
    }
}

/// Fails on every call.
pub struct FailingTransform;

impl Transform for FailingTransform {
    fn name(&self) -> &str {
        "failing"
    }

    fn apply(&mut self, _inputs: &[Element]) -> std::result::Result<Vec<Element>, TransformError> {
        Err(TransformError::Failed("model exploded".to_string()))
    }
}
