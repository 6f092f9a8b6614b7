//! An engine shared between a driver thread and injectors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use pf_core::Real;
use tracing::info;

use crate::actions::Action;
use crate::engine::{Engine, StepReport};
use crate::error::{SimError, SimResult};

/// Cloneable handle to one engine.
///
/// Injecting an action and advancing a step take the same lock, so they
/// never interleave. `cancel` is checked between steps of `run_for`.
#[derive(Clone)]
pub struct SharedEngine {
    engine: Arc<Mutex<Engine>>,
    cancel: Arc<AtomicBool>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue an action for the next step.
    pub fn inject(&self, action: Action) -> SimResult<()> {
        self.lock()?.queue_action(action)
    }

    /// Run exactly one step.
    pub fn advance(&self) -> SimResult<StepReport> {
        self.lock()?.step()
    }

    /// Run steps covering `duration_s`, releasing the lock between steps.
    /// Stops with `SimError::Cancelled` once `cancel` is observed; the flag
    /// is reset so the next run starts clean.
    pub fn run_for(&self, duration_s: Real) -> SimResult<usize> {
        let steps = self.lock()?.data().config.steps_for(duration_s);
        for done in 0..steps {
            if self.cancel.swap(false, Ordering::SeqCst) {
                info!(steps = done, "run cancelled");
                return Err(SimError::Cancelled { steps: done });
            }
            self.lock()?.step()?;
        }
        Ok(steps)
    }

    /// Ask a running `run_for` to stop before its next step.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut Engine) -> T) -> SimResult<T> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    pub fn get_scalar(&self, name: &str) -> SimResult<Option<Real>> {
        Ok(self.lock()?.get_scalar(name))
    }

    fn lock(&self) -> SimResult<MutexGuard<'_, Engine>> {
        self.engine.lock().map_err(|_| SimError::Halted {
            reason: "engine lock poisoned".to_string(),
        })
    }
}
