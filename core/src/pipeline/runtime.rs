//! pipeline/runtime.rs
//! Lane wiring, task submission and shutdown.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Sender};
use tracing::{info, warn};

use crate::collaborator::Collaborator;
use crate::pipeline::channel::{lane_queue, send_or_halt, HaltSignal, HaltSwitch};
use crate::pipeline::compute::Compute;
use crate::pipeline::egress::Egress;
use crate::pipeline::health::{spawn_lane, LaneHealth, LaneReport, LaneRole, LaneStatus};
use crate::pipeline::ingress::Ingress;
use crate::pipeline::parallelism::PipelineProfile;
use crate::pipeline::types::{ComputeMessage, PipelineJob};
use crate::pipeline::watchdog::{FailureHook, Watchdog};
use crate::protocol::{MetaPacket, SidebandWriter};
use crate::telemetry::{LaneCounters, PipelineSnapshot, StageTimes, TelemetryTimer};
use crate::transform::TransformFactory;
use crate::types::{Result, WorkerError};

/// Everything needed to start a pipeline.
pub struct PipelineConfig {
    pub meta: MetaPacket,
    pub collaborator: Arc<dyn Collaborator>,
    pub transform: TransformFactory,
    pub profile: PipelineProfile,
    pub acks: SidebandWriter,
    pub on_failure: FailureHook,
}

pub struct PipelineRuntime {
    tasks: Option<Sender<PipelineJob>>,
    gate: Sender<()>,
    halt: Arc<HaltSwitch>,
    signal: HaltSignal,
    lanes: Vec<(LaneHealth, JoinHandle<LaneReport>)>,
    watchdog: Option<Watchdog>,
    timer: TelemetryTimer,
    profile: PipelineProfile,
}

impl PipelineRuntime {
    /// Spawn `lanes` ingress/egress pairs, the compute stage and the watchdog.
    pub fn start(cfg: PipelineConfig) -> Result<Self> {
        let PipelineConfig { meta, collaborator, transform, profile, acks, on_failure } = cfg;
        profile.validate()?;

        let n = profile.lanes;
        let halt = Arc::new(HaltSwitch::new());
        let signal = halt.signal();

        let (task_tx, task_rx) = lane_queue::<PipelineJob>();
        let (gate_tx, gate_rx) = bounded::<()>(profile.max_open_tasks);
        let (compute_tx, compute_rx) = lane_queue::<ComputeMessage>();
        let (egress_txs, egress_rxs): (Vec<_>, Vec<_>) = (0..n).map(|_| lane_queue()).unzip();

        let input_types = meta.input_types();
        let mut lanes = Vec::with_capacity(2 * n + 1);

        // ---- ingress ----
        for worker_id in 0..n {
            let health = LaneHealth::new(LaneRole::Ingress, Some(worker_id));
            let lane = Ingress {
                worker_id,
                input_types: input_types.clone(),
                collaborator: Arc::clone(&collaborator),
                tasks: task_rx.clone(),
                compute: compute_tx.clone(),
                halt: signal.clone(),
            };
            let handle = spawn_lane(health.clone(), move || lane.run())?;
            lanes.push((health, handle));
        }
        // Compute exits once every ingress lane has dropped its sender.
        drop(compute_tx);

        // ---- compute ----
        let health = LaneHealth::new(LaneRole::Compute, None);
        let lane = Compute {
            transform,
            output_types: meta.output_types(),
            inbox: compute_rx,
            egress: egress_txs,
            halt: signal.clone(),
        };
        let handle = spawn_lane(health.clone(), move || lane.run())?;
        lanes.push((health, handle));

        // ---- egress ----
        for (worker_id, inbox) in egress_rxs.into_iter().enumerate() {
            let health = LaneHealth::new(LaneRole::Egress, Some(worker_id));
            let lane = Egress {
                worker_id,
                outputs: meta.outputs.clone(),
                collaborator: Arc::clone(&collaborator),
                inbox,
                acks: acks.clone(),
                gate: gate_rx.clone(),
                halt: signal.clone(),
            };
            let handle = spawn_lane(health.clone(), move || lane.run())?;
            lanes.push((health, handle));
        }

        let watched = lanes.iter().map(|(h, _)| h.clone()).collect();
        let watchdog = Watchdog::spawn(watched, Arc::clone(&halt), profile.watchdog_interval(), on_failure)?;

        info!(lanes = n, max_open_tasks = profile.max_open_tasks, "pipeline started");

        Ok(Self {
            tasks: Some(task_tx),
            gate: gate_tx,
            halt,
            signal,
            lanes,
            watchdog: Some(watchdog),
            timer: TelemetryTimer::new(),
            profile,
        })
    }

    /// Queue a task. Blocks while `max_open_tasks` are unacknowledged or
    /// every ingress lane is busy.
    pub fn submit(&self, job: PipelineJob) -> Result<()> {
        let tasks = self
            .tasks
            .as_ref()
            .ok_or_else(|| WorkerError::LaneFailure("pipeline is closed".to_string()))?;
        send_or_halt(&self.gate, (), &self.signal)?;
        send_or_halt(tasks, job, &self.signal)
    }

    pub fn lane_states(&self) -> Vec<(String, LaneStatus)> {
        self.lanes.iter().map(|(h, _)| (h.name().to_string(), h.status())).collect()
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_tripped()
    }

    pub fn profile(&self) -> &PipelineProfile {
        &self.profile
    }

    /// Stop accepting tasks, drain every lane and join it.
    ///
    /// Fails if any lane died or was halted.
    pub fn close(mut self) -> Result<PipelineSnapshot> {
        self.tasks.take();

        let mut counters = LaneCounters::default();
        let mut stage_times = StageTimes::default();
        let mut failures = Vec::new();
        let mut halted = 0usize;

        for (health, handle) in self.lanes.drain(..) {
            if let Ok(report) = handle.join() {
                if health.role() == LaneRole::Egress {
                    counters.merge(&report.counters);
                }
                stage_times.merge(&report.stage_times);
            }
            match health.status() {
                LaneStatus::Failed => failures.push(format!(
                    "{}: {}",
                    health.name(),
                    health.failure().unwrap_or_else(|| "unknown failure".to_string())
                )),
                LaneStatus::Halted => halted += 1,
                LaneStatus::Running | LaneStatus::Clean => {}
            }
        }

        let acted_on = self.watchdog.take().and_then(|mut w| w.stop());

        if !failures.is_empty() || halted > 0 {
            warn!(failed = failures.len(), halted, "pipeline closed after lane failure");
            let detail = acted_on.unwrap_or_else(|| failures.join("; "));
            return Err(WorkerError::LaneFailure(if detail.is_empty() {
                "pipeline halted".to_string()
            } else {
                detail
            }));
        }

        let snapshot = PipelineSnapshot::from(self.profile.lanes, &counters, stage_times, &self.timer);
        info!(
            tasks = snapshot.tasks,
            chunks = snapshot.chunks,
            elements = snapshot.elements,
            bytes_out = snapshot.bytes_out,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "pipeline closed"
        );
        Ok(snapshot)
    }
}
