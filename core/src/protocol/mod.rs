//! protocol/mod.rs
//! Frame-level protocol spoken over stdin/stdout.
//!
//! - `types`: meta packet, control frames, output frames, job descriptors
//! - `context`: explicit stream context (reader, writer, meta)
//! - `session`: per-key `init → job* → finish` state machine
//! - `handlers`: per-frame and accumulate job handlers
//! - `sideband`: line-oriented operator RPC (`skjson` responses)

pub mod types;
pub mod context;
pub mod session;
pub mod handlers;
pub mod sideband;

pub use types::*;
pub use context::{OutputSink, StreamContext};
pub use session::{JobHandler, JobSession, SessionStats};
pub use handlers::{AccumulateHandler, PerFrameHandler};
pub use sideband::{serve, SidebandName, SidebandRequest, SidebandResponse, SidebandWriter};
