//! telemetry/mod.rs
//! Pipeline telemetry: per-lane counters, stage timers and the snapshot
//! returned when the pipeline closes.
//!
//! Notes:
//! - Every lane owns its counters and timers; they are merged once, at join,
//!   so the hot path takes no locks.
//! - Snapshots are immutable and serializable for logging.

pub mod counters;
pub mod timers;
pub mod snapshot;

pub use counters::*;
pub use timers::*;
pub use snapshot::*;
