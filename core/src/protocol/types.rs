use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::{CodecError, DataType};

// ============================================================
// Meta packet
// ============================================================

/// One input or output slot. Only `DataType` is interpreted; the rest
/// (`ID`, `Name`, ...) is kept verbatim for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    #[serde(rename = "DataType")]
    pub data_type: DataType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    pub fn new(data_type: DataType) -> Self {
        Self { data_type, extra: Map::new() }
    }

    pub fn named(data_type: DataType, name: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("Name".to_string(), Value::String(name.to_string()));
        Self { data_type, extra }
    }
}

/// Stream header, read once. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaPacket {
    pub inputs: Vec<Dataset>,
    pub outputs: Vec<Dataset>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl MetaPacket {
    pub fn from_types(inputs: &[DataType], outputs: &[DataType]) -> Self {
        Self {
            inputs: inputs.iter().copied().map(Dataset::new).collect(),
            outputs: outputs.iter().copied().map(Dataset::new).collect(),
            url: None,
            port: None,
        }
    }

    pub fn input_types(&self) -> Vec<DataType> {
        self.inputs.iter().map(|d| d.data_type).collect()
    }

    pub fn output_types(&self) -> Vec<DataType> {
        self.outputs.iter().map(|d| d.data_type).collect()
    }

    /// Base URL of the orchestrator's per-worker HTTP server.
    pub fn local_url(&self) -> Option<String> {
        self.port.map(|p| format!("http://127.0.0.1:{}", p))
    }
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(rename = "DataType")]
    data_type: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Wire shape of the meta packet. Accepts the dataset form
/// (`Inputs`/`Outputs`) and the bare tag form (`InputTypes`/`OutputTypes`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMetaPacket {
    #[serde(default)]
    inputs: Option<Vec<RawDataset>>,
    #[serde(default)]
    outputs: Option<Vec<RawDataset>>,
    #[serde(default)]
    input_types: Option<Vec<String>>,
    #[serde(default)]
    output_types: Option<Vec<String>>,
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

fn resolve_slots(datasets: Option<Vec<RawDataset>>, tags: Option<Vec<String>>) -> Result<Vec<Dataset>, CodecError> {
    match (datasets, tags) {
        (Some(datasets), _) => datasets
            .into_iter()
            .map(|d| -> Result<Dataset, CodecError> {
                Ok(Dataset { data_type: d.data_type.parse()?, extra: d.extra })
            })
            .collect(),
        (None, Some(tags)) => tags
            .iter()
            .map(|t| -> Result<Dataset, CodecError> { Ok(Dataset::new(t.parse()?)) })
            .collect(),
        (None, None) => Ok(Vec::new()),
    }
}

impl TryFrom<RawMetaPacket> for MetaPacket {
    type Error = CodecError;

    /// Unknown tags fail with `UnsupportedType`.
    fn try_from(raw: RawMetaPacket) -> Result<Self, Self::Error> {
        Ok(Self {
            inputs: resolve_slots(raw.inputs, raw.input_types)?,
            outputs: resolve_slots(raw.outputs, raw.output_types)?,
            url: raw.url,
            port: raw.port,
        })
    }
}

// ============================================================
// Control / output frames
// ============================================================

/// Orchestrator → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "snake_case")]
pub enum ControlFrame {
    #[serde(rename_all = "PascalCase")]
    Init { key: String },
    /// Followed by one payload frame per input slot.
    #[serde(rename_all = "PascalCase")]
    Job { key: String, length: usize },
    #[serde(rename_all = "PascalCase")]
    Finish { key: String },
}

impl ControlFrame {
    pub fn key(&self) -> &str {
        match self {
            ControlFrame::Init { key } | ControlFrame::Job { key, .. } | ControlFrame::Finish { key } => key,
        }
    }
}

/// Worker → orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "snake_case")]
pub enum OutputFrame {
    /// Followed by one payload frame per output slot.
    #[serde(rename_all = "PascalCase")]
    DataData { key: String, output_key: String, length: usize },
    #[serde(rename_all = "PascalCase")]
    DataFinish { key: String, output_key: String },
    #[serde(rename_all = "PascalCase")]
    Finish { key: String },
}

// ============================================================
// Job descriptor
// ============================================================

/// Opaque per-key value threaded from one handler call to the next.
pub type WorkerState = Option<Box<dyn Any + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Job,
    Finish,
}

/// First argument of every handler call.
pub struct JobDescriptor {
    pub kind: JobKind,
    pub key: String,
    /// Element count of the attached chunk; `None` on finish.
    pub length: Option<usize>,
    pub state: WorkerState,
}

impl fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("length", &self.length)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}
