use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{self, DataType};
use crate::pipeline::OutputDefaults;
use crate::protocol::handlers::stack_outputs;
use crate::protocol::Dataset;
use crate::transform::Element;
use crate::types::Result;

/// First chunk of every `/build` body: one entry per output dataset.
#[derive(Debug, Serialize)]
pub struct OutputMeta<'a> {
    #[serde(rename = "Dataset")]
    pub dataset: &'a Dataset,
    #[serde(rename = "Key")]
    pub key: &'a str,
    /// JSON-encoded metadata of the output item.
    #[serde(rename = "Metadata")]
    pub metadata: String,
}

/// Metadata of each output slot, taken from the first computed element.
pub fn row_metadata(first_row: Option<&[Element]>, slots: usize) -> Vec<Value> {
    (0..slots)
        .map(|i| {
            first_row
                .and_then(|row| row.get(i))
                .map(|el| el.metadata.clone())
                .unwrap_or(Value::Null)
        })
        .collect()
}

pub fn output_metas<'a>(outputs: &'a [Dataset], key: &'a str, metadata: &[Value]) -> Vec<OutputMeta<'a>> {
    outputs
        .iter()
        .enumerate()
        .map(|(i, dataset)| OutputMeta {
            dataset,
            key,
            metadata: match metadata.get(i) {
                None | Some(Value::Null) => "{}".to_string(),
                Some(v) => v.to_string(),
            },
        })
        .collect()
}

/// Encoded metas frame, ready to be the first body chunk.
pub fn encode_metas(outputs: &[Dataset], key: &str, metadata: &[Value]) -> Result<Bytes> {
    Ok(Bytes::from(codec::encode_frame(&output_metas(outputs, key, metadata))?))
}

/// Encodes the chunks of one `/build` body: the metas frame once, then
/// one slot set per chunk of computed rows.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    key: String,
    outputs: Vec<Dataset>,
    output_types: Vec<DataType>,
    defaults: OutputDefaults,
    metas_sent: bool,
}

impl ChunkEncoder {
    pub fn new(outputs: &[Dataset], key: &str, defaults: OutputDefaults) -> Self {
        Self {
            key: key.to_string(),
            outputs: outputs.to_vec(),
            output_types: outputs.iter().map(|d| d.data_type).collect(),
            defaults,
            metas_sent: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_defaults(&mut self, defaults: OutputDefaults) {
        self.defaults = defaults;
    }

    pub fn metas_sent(&self) -> bool {
        self.metas_sent
    }

    /// Metas frame, decorated with the output defaults. Metadata comes
    /// from the first computed row, `{}` when there is none.
    pub fn metas(&mut self, first_row: Option<&[Element]>) -> Result<Bytes> {
        self.metas_sent = true;
        let metadata: Vec<Value> = row_metadata(first_row, self.output_types.len())
            .into_iter()
            .zip(&self.output_types)
            .map(|(md, dt)| self.defaults.decorate(*dt, md))
            .collect();
        encode_metas(&self.outputs, &self.key, &metadata)
    }

    pub fn rows(&self, rows: Vec<Vec<Element>>) -> Result<Bytes> {
        let mut payloads = stack_outputs(&self.output_types, rows)?;
        for payload in &mut payloads {
            self.defaults.fill_payload(payload);
        }
        Ok(Bytes::from(codec::encode_slots(&self.output_types, &payloads)?))
    }
}
