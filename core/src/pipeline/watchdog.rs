//! Supervisory thread: polls lane health, turns the first death into a
//! pipeline-wide halt and hands the failure to the hook.

use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, select, Sender};
use tracing::{debug, error};

use crate::pipeline::channel::HaltSwitch;
use crate::pipeline::health::{LaneHealth, LaneStatus};
use crate::types::{Result, WorkerError};

/// Called once, from the watchdog thread, with the first lane failure.
pub type FailureHook = Arc<dyn Fn(&WorkerError) + Send + Sync>;

/// Default hook: a dead lane takes the whole worker down.
pub fn exit_on_failure() -> FailureHook {
    Arc::new(|err: &WorkerError| {
        error!(error = %err, "pipeline lane died, aborting worker");
        process::exit(i32::from(err.exit_code()));
    })
}

pub struct Watchdog {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<Option<String>>>,
}

impl Watchdog {
    pub fn spawn(
        lanes: Vec<LaneHealth>,
        halt: Arc<HaltSwitch>,
        interval: Duration,
        on_failure: FailureHook,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => {
                        debug!("watchdog stopped");
                        return None;
                    }
                    default(interval) => {}
                }

                if let Some(dead) = lanes.iter().find(|l| l.status() == LaneStatus::Failed) {
                    let detail = dead.failure().unwrap_or_else(|| "unknown failure".to_string());
                    let err = WorkerError::LaneFailure(format!("{} died: {}", dead.name(), detail));
                    error!(lane = dead.name(), error = %detail, "lane death detected, halting pipeline");

                    halt.trip();
                    on_failure(&err);
                    return Some(err.to_string());
                }
            })
            .map_err(WorkerError::Io)?;

        Ok(Self { stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Stop polling and return the failure the watchdog acted on, if any.
    pub fn stop(&mut self) -> Option<String> {
        self.stop_tx.take();
        self.handle.take().and_then(|h| h.join().ok().flatten())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop_tx.take();
    }
}
