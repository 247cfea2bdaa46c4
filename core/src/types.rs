use std::io;

use thiserror::Error;

use crate::codec::CodecError;
use crate::constants::exit_codes;
use crate::transform::TransformError;

/// Unified worker error covering codec, protocol, transform, pipeline and collaborator faults.
/// - `From<T>` impls enable `?` across layers.
/// - Nothing is retried: every variant except `Codec(EndOfStream)` is fatal.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Orchestrator and worker disagree about a key's lifecycle.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// A pipeline lane or the compute stage died.
    #[error("lane failure: {0}")]
    LaneFailure(String),

    /// A blocking queue operation was aborted by the watchdog.
    #[error("pipeline halted")]
    Halted,

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown transform: {0}")]
    UnknownTransform(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    /// Clean shutdown signal rather than a fault.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, WorkerError::Codec(CodecError::EndOfStream))
    }

    /// Process exit code for this error family.
    pub fn exit_code(&self) -> u8 {
        match self {
            WorkerError::Codec(_) => exit_codes::CODEC,
            WorkerError::ProtocolViolation(_) => exit_codes::PROTOCOL,
            WorkerError::Transform(_) => exit_codes::TRANSFORM,
            WorkerError::LaneFailure(_) | WorkerError::Halted => exit_codes::LANE_FAILURE,
            WorkerError::Config(_) | WorkerError::UnknownTransform(_) => exit_codes::CONFIG,
            WorkerError::Collaborator(_)
            | WorkerError::Http(_)
            | WorkerError::Io(_)
            | WorkerError::Json(_) => exit_codes::GENERIC,
        }
    }
}

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;
