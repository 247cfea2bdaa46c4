//! skyhook-core
//!
//! Worker-side runtime for the skyhook orchestrator: typed wire codec,
//! per-key job protocol, sideband operators and the pipelined runtime.
//! Transforms are supplied by the embedding binary through the registry.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod config;

// Wire and protocol layers
pub mod codec;
pub mod protocol;
pub mod operator;
pub mod collaborator;

// Compute
pub mod transform;
pub mod pipeline;
pub mod telemetry;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::codec::{ArrayData, DataType, ElementType, TypedPayload};
    pub use crate::collaborator::{Collaborator, HttpCollaborator};
    pub use crate::config::{HandlerKind, OperatorKind, WorkerConfig, WorkerMode};
    pub use crate::operator::{build_operator, ApplyOutcome, Item, Operator, OperatorContext, Task};
    pub use crate::pipeline::{exit_on_failure, PipelineProfile, PipelineRuntime, PipelineConfig};
    pub use crate::protocol::{
        serve, AccumulateHandler, JobHandler, JobSession, MetaPacket, PerFrameHandler, SidebandWriter,
        StreamContext,
    };
    pub use crate::transform::{Element, Transform, TransformError, TransformRegistry};
    pub use crate::types::{Result, WorkerError};
}
