//! telemetry/counters.rs
//! Mutable counters owned by one pipeline lane.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneCounters {
    /// Tasks pulled (ingress) or acknowledged (egress).
    pub tasks: u64,
    /// Chunks read, computed or written.
    pub chunks: u64,
    /// Elements across those chunks.
    pub elements: u64,
    /// Encoded bytes handed to `/build`.
    pub bytes_out: u64,
}

impl LaneCounters {
    pub fn add_task(&mut self) {
        self.tasks += 1;
    }

    pub fn add_chunk(&mut self, elements: usize) {
        self.chunks += 1;
        self.elements += elements as u64;
    }

    pub fn add_bytes_out(&mut self, n: usize) {
        self.bytes_out += n as u64;
    }

    // Lanes merge once, at join: no locks or atomics on the hot path.
    pub fn merge(&mut self, other: &LaneCounters) {
        self.tasks += other.tasks;
        self.chunks += other.chunks;
        self.elements += other.elements;
        self.bytes_out += other.bytes_out;
    }
}

impl AddAssign for LaneCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
