//! Operator RPC.
//!
//! Requests arrive as length-prefixed frames on stdin:
//!   `{RequestID, Name: "parallelism" | "get_tasks" | "apply", JSON}`
//! Responses go out as single stdout lines:
//!   `skjson{"RequestID": .., "JSON": ..}`
//! `JSON` on both sides is itself a JSON-encoded string.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{self, CodecError};
use crate::constants::SIDEBAND_PREFIX;
use crate::operator::{ApplyOutcome, Operator, RawItems, RequestId, Task};
use crate::types::{Result, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidebandName {
    Parallelism,
    GetTasks,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebandRequest {
    #[serde(rename = "RequestID")]
    pub request_id: RequestId,
    #[serde(rename = "Name")]
    pub name: SidebandName,
    #[serde(rename = "JSON", default)]
    pub json: Option<String>,
}

impl SidebandRequest {
    /// Decode the request parameters.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T> {
        match self.json.as_deref() {
            Some(s) if !s.is_empty() => Ok(serde_json::from_str(s)?),
            _ => Err(WorkerError::ProtocolViolation(format!(
                "{:?} request {} carries no parameters",
                self.name, self.request_id
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebandResponse {
    #[serde(rename = "RequestID")]
    pub request_id: RequestId,
    #[serde(rename = "JSON", default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
}

/// Shared, line-atomic writer for sideband responses.
///
/// Cloned into every pipeline egress lane; one lock per response line.
#[derive(Clone)]
pub struct SidebandWriter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SidebandWriter {
    pub fn new<W: Write + Send + 'static>(w: W) -> Self {
        Self { out: Arc::new(Mutex::new(Box::new(w))) }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn respond(&self, resp: &SidebandResponse) -> Result<()> {
        let line = format!("{}{}\n", SIDEBAND_PREFIX, serde_json::to_string(resp)?);
        let mut out = self
            .out
            .lock()
            .map_err(|_| WorkerError::LaneFailure("sideband writer poisoned".to_string()))?;
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Response without a value: completion of `apply`.
    pub fn ack(&self, request_id: RequestId) -> Result<()> {
        self.respond(&SidebandResponse { request_id, json: None })
    }

    pub fn reply<T: Serialize + ?Sized>(&self, request_id: RequestId, value: &T) -> Result<()> {
        self.respond(&SidebandResponse {
            request_id,
            json: Some(serde_json::to_string(value)?),
        })
    }
}

/// Serve RPC requests until end of stream, then close the operator.
///
/// `apply` is acknowledged here only when the operator completes it
/// synchronously; deferred work is acknowledged by whoever finishes it.
pub fn serve<R: Read + ?Sized>(reader: &mut R, operator: &mut dyn Operator, writer: &SidebandWriter) -> Result<u64> {
    let mut served = 0u64;

    loop {
        let req: SidebandRequest = match codec::read_frame(reader) {
            Ok(req) => req,
            Err(CodecError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        };
        debug!(request_id = req.request_id, name = ?req.name, "sideband request");

        match req.name {
            SidebandName::Parallelism => writer.reply(req.request_id, &operator.parallelism())?,
            SidebandName::GetTasks => {
                let raw: RawItems = req.params()?;
                let tasks = operator.get_tasks(&raw)?;
                writer.reply(req.request_id, &tasks)?;
            }
            SidebandName::Apply => {
                let task: Task = req.params()?;
                match operator.apply(req.request_id, task)? {
                    ApplyOutcome::Completed => writer.ack(req.request_id)?,
                    ApplyOutcome::Deferred => {}
                }
            }
        }
        served += 1;
    }

    info!(served, "sideband stream closed");
    operator.close()?;
    Ok(served)
}
