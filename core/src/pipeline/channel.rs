//! Bounded lane queues and the pipeline-wide halt signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam::channel::{bounded, select, Receiver, Sender, TryRecvError};

use crate::constants::QUEUE_CAPACITY;
use crate::types::{Result, WorkerError};

/// Capacity-1 queue: a producer blocks until the previous message is taken.
pub fn lane_queue<T>() -> (Sender<T>, Receiver<T>) {
    bounded(QUEUE_CAPACITY)
}

/// Owner side of the halt signal. Tripping it disconnects every
/// `HaltSignal`, which wakes all blocked queue operations at once.
pub struct HaltSwitch {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
    tripped: AtomicBool,
}

impl HaltSwitch {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx: Mutex::new(Some(tx)), rx, tripped: AtomicBool::new(false) }
    }

    pub fn signal(&self) -> HaltSignal {
        HaltSignal { rx: self.rx.clone() }
    }

    /// Idempotent.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

impl Default for HaltSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of the halt signal, cloned into every lane.
#[derive(Clone)]
pub struct HaltSignal {
    rx: Receiver<()>,
}

impl HaltSignal {
    pub fn is_halted(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Blocking receive that aborts with `Halted` when the switch trips.
/// `Ok(None)` means every producer is gone.
pub fn recv_or_halt<T>(rx: &Receiver<T>, halt: &HaltSignal) -> Result<Option<T>> {
    if halt.is_halted() {
        return Err(WorkerError::Halted);
    }
    select! {
        recv(rx) -> msg => Ok(msg.ok()),
        recv(halt.rx) -> _ => Err(WorkerError::Halted),
    }
}

/// Blocking send that aborts with `Halted` when the switch trips.
pub fn send_or_halt<T>(tx: &Sender<T>, msg: T, halt: &HaltSignal) -> Result<()> {
    if halt.is_halted() {
        return Err(WorkerError::Halted);
    }
    select! {
        send(tx, msg) -> res => res.map_err(|_| WorkerError::LaneFailure("queue consumer is gone".to_string())),
        recv(halt.rx) -> _ => Err(WorkerError::Halted),
    }
}
