//! Lane liveness, as seen by the watchdog.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::telemetry::{LaneCounters, StageTimes};
use crate::types::{Result, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneRole {
    Ingress,
    Compute,
    Egress,
}

impl fmt::Display for LaneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaneRole::Ingress => "ingress",
            LaneRole::Compute => "compute",
            LaneRole::Egress => "egress",
        })
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneStatus {
    Running = 0,
    /// Input exhausted, exited normally.
    Clean = 1,
    /// Aborted by the halt signal after another lane died.
    Halted = 2,
    /// Returned an error or panicked.
    Failed = 3,
}

impl LaneStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LaneStatus::Running,
            1 => LaneStatus::Clean,
            2 => LaneStatus::Halted,
            _ => LaneStatus::Failed,
        }
    }

    pub fn is_terminated(self) -> bool {
        self != LaneStatus::Running
    }
}

/// Shared status cell of one lane thread.
#[derive(Clone)]
pub struct LaneHealth {
    name: Arc<str>,
    role: LaneRole,
    status: Arc<AtomicU8>,
    failure: Arc<Mutex<Option<String>>>,
}

impl LaneHealth {
    pub fn new(role: LaneRole, index: Option<usize>) -> Self {
        let name: Arc<str> = match index {
            Some(i) => format!("{}-{}", role, i).into(),
            None => role.to_string().into(),
        };
        Self {
            name,
            role,
            status: Arc::new(AtomicU8::new(LaneStatus::Running as u8)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> LaneRole {
        self.role
    }

    pub fn status(&self) -> LaneStatus {
        LaneStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|f| f.clone())
    }

    fn mark(&self, status: LaneStatus, failure: Option<String>) {
        if let Some(msg) = failure {
            if let Ok(mut slot) = self.failure.lock() {
                *slot = Some(msg);
            }
        }
        self.status.store(status as u8, Ordering::SeqCst);
    }
}

/// Marks the lane `Failed` unless it finished through `finish`
/// (covers panics unwinding out of the lane body).
struct LaneGuard {
    health: LaneHealth,
    finished: bool,
}

impl LaneGuard {
    fn finish(mut self, status: LaneStatus, failure: Option<String>) {
        self.finished = true;
        self.health.mark(status, failure);
    }
}

impl Drop for LaneGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.health.mark(LaneStatus::Failed, Some("lane panicked".to_string()));
        }
    }
}

/// What a lane hands back when joined.
#[derive(Debug, Clone, Default)]
pub struct LaneReport {
    pub counters: LaneCounters,
    pub stage_times: StageTimes,
}

/// Spawn a named lane thread whose outcome is recorded in `health`.
pub fn spawn_lane<F>(health: LaneHealth, body: F) -> Result<JoinHandle<LaneReport>>
where
    F: FnOnce() -> Result<LaneReport> + Send + 'static,
{
    let name = health.name().to_string();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let guard = LaneGuard { health, finished: false };
            match body() {
                Ok(report) => {
                    debug!(lane = %name, "lane finished");
                    guard.finish(LaneStatus::Clean, None);
                    report
                }
                Err(WorkerError::Halted) => {
                    debug!(lane = %name, "lane halted");
                    guard.finish(LaneStatus::Halted, None);
                    LaneReport::default()
                }
                Err(e) => {
                    error!(lane = %name, error = %e, "lane died");
                    guard.finish(LaneStatus::Failed, Some(e.to_string()));
                    LaneReport::default()
                }
            }
        })
        .map_err(WorkerError::Io)
}
