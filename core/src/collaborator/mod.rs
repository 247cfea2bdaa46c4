//! collaborator/mod.rs
//! Calls into the orchestrator's HTTP endpoints.
//!
//! The endpoints are opaque to the worker: it streams encoded chunks in
//! and out and never interprets the orchestrator's storage.

pub mod http;
pub mod reader;

use std::io::Read;

use bytes::Bytes;
use serde_json::Value;

use crate::operator::Item;
use crate::types::Result;

pub use http::HttpCollaborator;
pub use reader::ChunkReader;

/// Lazily produced request body, pulled chunk by chunk by the HTTP client.
pub type ChunkStream = Box<dyn Iterator<Item = Result<Bytes>> + Send>;

pub trait Collaborator: Send + Sync {
    /// `POST /synchronized-reader`: encoded chunks of the items, one payload per item per chunk.
    fn synchronized_reader(&self, items: &[Item]) -> Result<Box<dyn Read + Send>>;

    /// `POST /build`: consumes `body` until exhausted.
    fn build(&self, body: ChunkStream) -> Result<()>;

    /// `POST /load-data`: one encoded payload for one item.
    fn load_data(&self, item: &Item) -> Result<Box<dyn Read + Send>>;

    /// `POST /write-item`: `{Dataset, Key}` header frame followed by one payload.
    fn write_item(&self, body: Vec<u8>) -> Result<()>;

    /// `GET /config`
    fn config(&self) -> Result<Value>;

    /// `GET /datasets/{id}/items`
    fn dataset_items(&self, dataset_id: i64) -> Result<Vec<Item>>;
}
