//! Lifecycle controller.
//!
//! Models the instance lifecycle as an explicit state machine rather than ad
//! hoc flags: the slot either holds the live [`Worker`] or is `Stopped`.
//! Transitions are serialized by the slot mutex, which is what keeps "at
//! most one scheduler thread per instance" true under concurrent callers.

use log::debug;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::worker::{Job, Worker};
use crate::core::{AgentError, LifecycleState, Result};

pub(crate) struct Lifecycle {
    slot: Mutex<Slot>,
}

enum Slot {
    Active(Worker),
    Stopped,
}

impl Lifecycle {
    /// New instances begin stopped; activation is the caller's first move.
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Stopped),
        }
    }

    /// Transition to active, using `spawn` to build the worker (which runs
    /// the initialization hook before returning).
    ///
    /// Calling `start` on an already-active instance is a no-op: the running
    /// scheduler thread and its queue are left untouched. The slot stays
    /// `Stopped` if `spawn` fails, so a failed activation leaves nothing
    /// half-initialized.
    pub(crate) fn start<F>(&self, spawn: F) -> Result<()>
    where
        F: FnOnce() -> Result<Worker>,
    {
        let mut slot = self.slot.lock()?;
        match &*slot {
            Slot::Active(_) => Ok(()),
            Slot::Stopped => {
                let worker = spawn()?;
                *slot = Slot::Active(worker);
                debug!("scheduler thread started");
                Ok(())
            }
        }
    }

    /// Transition to stopped. No-op when already stopped.
    ///
    /// The slot flips before the worker is torn down, so concurrent
    /// dispatches fail fast with [`AgentError::Stopped`] instead of racing
    /// the teardown. Does not return until the scheduler thread has been
    /// joined.
    pub(crate) fn stop(&self) -> Result<()> {
        let mut slot = self.slot.lock()?;
        if let Slot::Active(worker) = std::mem::replace(&mut *slot, Slot::Stopped) {
            worker.stop();
            debug!("scheduler thread stopped");
        }
        Ok(())
    }

    pub(crate) fn state(&self) -> LifecycleState {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            Slot::Active(_) => LifecycleState::Active,
            Slot::Stopped => LifecycleState::Stopped,
        }
    }

    /// Queue sender for one dispatch, or the invalid-state error. This is
    /// the gate every dispatched call passes first.
    pub(crate) fn sender(&self) -> Result<mpsc::UnboundedSender<Job>> {
        let slot = self.slot.lock()?;
        match &*slot {
            Slot::Active(worker) => Ok(worker.sender()),
            Slot::Stopped => Err(AgentError::Stopped),
        }
    }
}
