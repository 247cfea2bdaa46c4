use std::collections::HashMap;
use std::io::{Read, Write};

use tracing::{debug, info};

use crate::codec::TypedPayload;
use crate::protocol::context::{OutputSink, StreamContext};
use crate::protocol::types::{ControlFrame, JobDescriptor, JobKind, WorkerState};
use crate::types::{Result, WorkerError};

/// Per-job callback. The returned value becomes the key's new state.
pub trait JobHandler {
    fn call(
        &mut self,
        desc: JobDescriptor,
        inputs: Vec<Option<TypedPayload>>,
        out: &mut dyn OutputSink,
    ) -> Result<WorkerState>;
}

impl<H: JobHandler + ?Sized> JobHandler for Box<H> {
    fn call(
        &mut self,
        desc: JobDescriptor,
        inputs: Vec<Option<TypedPayload>>,
        out: &mut dyn OutputSink,
    ) -> Result<WorkerState> {
        (**self).call(desc, inputs, out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    Running,
}

struct Slot {
    phase: Phase,
    state: WorkerState,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub keys_initialized: u64,
    pub jobs: u64,
    pub keys_finished: u64,
}

/// Per-key `init → job* → finish` state machine.
///
/// Owns the state map for the lifetime of the stream. Any frame that does
/// not fit a key's lifecycle is a fatal `ProtocolViolation`.
pub struct JobSession<H> {
    handler: H,
    slots: HashMap<String, Slot>,
    stats: SessionStats,
}

impl<H: JobHandler> JobSession<H> {
    pub fn new(handler: H) -> Self {
        Self { handler, slots: HashMap::new(), stats: SessionStats::default() }
    }

    /// Drive the session until the orchestrator closes the stream.
    pub fn run<R: Read, W: Write>(&mut self, ctx: &mut StreamContext<R, W>) -> Result<SessionStats> {
        while let Some(frame) = ctx.next_control()? {
            self.dispatch(ctx, frame)?;
        }

        info!(
            jobs = self.stats.jobs,
            finished = self.stats.keys_finished,
            open = self.slots.len(),
            "job stream closed"
        );
        Ok(self.stats.clone())
    }

    pub fn dispatch<R: Read, W: Write>(&mut self, ctx: &mut StreamContext<R, W>, frame: ControlFrame) -> Result<()> {
        match frame {
            ControlFrame::Init { key } => self.init(&key),
            ControlFrame::Job { key, length } => {
                self.ensure_live(&key, "job")?;
                let inputs = ctx.read_inputs()?;
                self.job(&key, length, inputs, ctx)
            }
            ControlFrame::Finish { key } => {
                let arity = ctx.input_types().len();
                self.finish(&key, arity, ctx)
            }
        }
    }

    pub fn init(&mut self, key: &str) -> Result<()> {
        if self.slots.contains_key(key) {
            return Err(WorkerError::ProtocolViolation(format!("init for live key {:?}", key)));
        }
        debug!(key, "init");
        self.slots.insert(key.to_string(), Slot { phase: Phase::Initialized, state: None });
        self.stats.keys_initialized += 1;
        Ok(())
    }

    pub fn job(
        &mut self,
        key: &str,
        length: usize,
        inputs: Vec<TypedPayload>,
        out: &mut dyn OutputSink,
    ) -> Result<()> {
        let slot = self.live_slot(key, "job")?;
        let desc = JobDescriptor {
            kind: JobKind::Job,
            key: key.to_string(),
            length: Some(length),
            state: slot.state.take(),
        };
        debug!(key, length, phase = ?slot.phase, "job");

        let state = self.handler.call(desc, inputs.into_iter().map(Some).collect(), out)?;

        let slot = self.live_slot(key, "job")?;
        slot.state = state;
        slot.phase = Phase::Running;
        self.stats.jobs += 1;
        Ok(())
    }

    /// Run the finish callback with one `None` per input slot, drop the
    /// state and acknowledge with a `finish` frame.
    pub fn finish(&mut self, key: &str, input_arity: usize, out: &mut dyn OutputSink) -> Result<()> {
        let slot = self
            .slots
            .remove(key)
            .ok_or_else(|| WorkerError::ProtocolViolation(format!("finish for unknown key {:?}", key)))?;
        let desc = JobDescriptor {
            kind: JobKind::Finish,
            key: key.to_string(),
            length: None,
            state: slot.state,
        };

        self.handler.call(desc, vec![None; input_arity], out)?;
        out.emit_finish(key)?;

        debug!(key, "finish");
        self.stats.keys_finished += 1;
        Ok(())
    }

    pub fn is_live(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn live_keys(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    fn ensure_live(&self, key: &str, what: &str) -> Result<()> {
        if self.slots.contains_key(key) {
            Ok(())
        } else {
            Err(WorkerError::ProtocolViolation(format!("{} for unknown key {:?}", what, key)))
        }
    }

    fn live_slot(&mut self, key: &str, what: &str) -> Result<&mut Slot> {
        self.slots
            .get_mut(key)
            .ok_or_else(|| WorkerError::ProtocolViolation(format!("{} for unknown key {:?}", what, key)))
    }
}
