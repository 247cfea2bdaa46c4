//! pipeline/mod.rs
//! Concurrent batched inference: N ingress/egress lane pairs around one
//! serialized compute stage, supervised by a watchdog.
//!
//! ```text
//! submit ─▶ [task q] ─▶ ingress[0..N] ─▶ [compute q] ─▶ compute ─▶ [egress q 0..N] ─▶ egress[0..N] ─▶ /build + ack
//! ```
//!
//! Every queue has capacity 1. Any lane death halts the whole pipeline.

pub mod parallelism;
pub mod types;
pub mod channel;
pub mod health;
pub mod watchdog;
pub mod ingress;
pub mod compute;
pub mod egress;
pub mod runtime;

pub use parallelism::PipelineProfile;
pub use types::*;
pub use channel::{lane_queue, recv_or_halt, send_or_halt, HaltSignal, HaltSwitch};
pub use health::{LaneHealth, LaneReport, LaneRole, LaneStatus};
pub use watchdog::{exit_on_failure, FailureHook, Watchdog};
pub use runtime::{PipelineRuntime, PipelineConfig};
