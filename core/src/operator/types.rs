use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::collaborator::Collaborator;
use crate::operator::tasks;
use crate::protocol::MetaPacket;
use crate::types::Result;

/// Name of the item group every task and raw listing carries.
pub const INPUTS_GROUP: &str = "inputs";

pub type RequestId = u64;

/// Orchestrator item. Only `Key` (and the optional `Metadata` string) is
/// interpreted; the remaining fields are passed back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn new(key: &str) -> Self {
        Self { key: key.to_string(), extra: Map::new() }
    }

    /// Decoded `Metadata`: items carry it as a JSON-encoded string.
    /// Undecodable metadata is logged and read as `Null`.
    pub fn metadata(&self) -> Value {
        match self.extra.get("Metadata") {
            Some(Value::String(s)) if !s.is_empty() => serde_json::from_str(s).unwrap_or_else(|e| {
                warn!(key = %self.key, error = %e, "item metadata is not valid JSON, ignoring it");
                Value::Null
            }),
            Some(Value::String(_)) | None => Value::Null,
            Some(other) => other.clone(),
        }
    }
}

/// Per-input-slot item listings, grouped by name (`"inputs"`).
pub type RawItems = BTreeMap<String, Vec<Vec<Item>>>;

/// Items sharing one key across every input slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Items")]
    pub items: RawItems,
}

impl Task {
    /// One single-item list per input slot.
    pub fn new(key: &str, inputs: Vec<Item>) -> Self {
        let mut items = RawItems::new();
        items.insert(INPUTS_GROUP.to_string(), inputs.into_iter().map(|i| vec![i]).collect());
        Self { key: key.to_string(), items }
    }

    /// First item of every input slot, in slot order.
    pub fn input_items(&self) -> Vec<Item> {
        self.items
            .get(INPUTS_GROUP)
            .map(|slots| slots.iter().filter_map(|list| list.first().cloned()).collect())
            .unwrap_or_default()
    }
}

/// How `apply` finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Work is done; the RPC layer acknowledges the request now.
    Completed,
    /// Work continues in the background; whoever finishes it acknowledges.
    Deferred,
}

/// Everything an operator needs from its environment.
#[derive(Clone)]
pub struct OperatorContext {
    pub meta: MetaPacket,
    pub collaborator: Arc<dyn Collaborator>,
}

impl OperatorContext {
    pub fn new(meta: MetaPacket, collaborator: Arc<dyn Collaborator>) -> Self {
        Self { meta, collaborator }
    }
}

/// Polymorphic unit of work driven over the sideband RPC.
pub trait Operator {
    /// Tasks the orchestrator may dispatch concurrently.
    fn parallelism(&self) -> usize {
        1
    }

    fn get_tasks(&self, raw: &RawItems) -> Result<Vec<Task>> {
        Ok(tasks::inner_join(raw))
    }

    fn apply(&mut self, request_id: RequestId, task: Task) -> Result<ApplyOutcome>;

    /// Tear down background resources. Called once, at end of stream.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
