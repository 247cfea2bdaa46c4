use std::io::Read;

use reqwest::blocking::{Body, Client};
use serde_json::Value;
use tracing::debug;

use crate::collaborator::{ChunkReader, ChunkStream, Collaborator};
use crate::operator::Item;
use crate::protocol::MetaPacket;
use crate::types::{Result, WorkerError};

/// Blocking HTTP client for the orchestrator.
///
/// Data endpoints live on the per-worker local port, `/config` and
/// `/datasets` on the main URL. No request timeout is set: a stalled
/// orchestrator stalls the worker.
pub struct HttpCollaborator {
    client: Client,
    local_url: String,
    remote_url: Option<String>,
}

impl HttpCollaborator {
    pub fn new(local_url: impl Into<String>, remote_url: Option<String>) -> Result<Self> {
        let local_url = local_url.into();
        if !local_url.starts_with("http://") && !local_url.starts_with("https://") {
            return Err(WorkerError::Config(format!(
                "collaborator url must start with http:// or https://, got {}",
                local_url
            )));
        }

        let client = Client::builder().timeout(None).build()?;
        Ok(Self {
            client,
            local_url: local_url.trim_end_matches('/').to_string(),
            remote_url: remote_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// Local endpoint from `Port`, remote from `URL`.
    pub fn from_meta(meta: &MetaPacket) -> Result<Self> {
        let local = meta
            .local_url()
            .ok_or_else(|| WorkerError::Config("meta packet has no Port".to_string()))?;
        Self::new(local, meta.url.clone())
    }

    fn local(&self, path: &str) -> String {
        format!("{}{}", self.local_url, path)
    }

    fn remote(&self, path: &str) -> Result<String> {
        self.remote_url
            .as_ref()
            .map(|base| format!("{}{}", base, path))
            .ok_or_else(|| WorkerError::Config("meta packet has no URL".to_string()))
    }
}

impl Collaborator for HttpCollaborator {
    fn synchronized_reader(&self, items: &[Item]) -> Result<Box<dyn Read + Send>> {
        debug!(items = items.len(), "POST /synchronized-reader");
        let resp = self
            .client
            .post(self.local("/synchronized-reader"))
            .json(items)
            .send()?
            .error_for_status()?;
        Ok(Box::new(resp))
    }

    fn build(&self, body: ChunkStream) -> Result<()> {
        debug!("POST /build");
        self.client
            .post(self.local("/build"))
            .body(Body::new(ChunkReader::new(body)))
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn load_data(&self, item: &Item) -> Result<Box<dyn Read + Send>> {
        debug!(key = %item.key, "POST /load-data");
        let resp = self
            .client
            .post(self.local("/load-data"))
            .json(item)
            .send()?
            .error_for_status()?;
        Ok(Box::new(resp))
    }

    fn write_item(&self, body: Vec<u8>) -> Result<()> {
        debug!(bytes = body.len(), "POST /write-item");
        self.client
            .post(self.local("/write-item"))
            .body(body)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn config(&self) -> Result<Value> {
        let resp = self.client.get(self.remote("/config")?).send()?.error_for_status()?;
        Ok(resp.json()?)
    }

    fn dataset_items(&self, dataset_id: i64) -> Result<Vec<Item>> {
        let url = self.remote(&format!("/datasets/{}/items", dataset_id))?;
        let resp = self.client.get(url).send()?.error_for_status()?;
        Ok(resp.json()?)
    }
}
