//! PhysiologySystem trait for pluggable subsystems.

use pf_core::Real;

use crate::actions::Action;
use crate::data::EngineData;
use crate::error::SimResult;

/// Trait for subsystems driven by the engine.
///
/// Each step the engine calls, for all systems in registration order:
/// 1) `pre_process`: read committed state and stage next values on owned
///    paths and reference nodes
/// 2) (engine solves every circuit)
/// 3) `process`: work on solved next values before they are committed
/// 4) (engine commits every circuit and runs substance transport)
/// 5) `post_process`: read committed results and derive aggregates
///
/// A system must not read another system's staged values in `pre_process`.
pub trait PhysiologySystem: Send {
    fn name(&self) -> &str;

    /// Build circuits and graphs and register them with `data`.
    /// Called once, before stabilization.
    fn initialize(&mut self, data: &mut EngineData) -> SimResult<()>;

    /// Whether this system consumes a typed action.
    fn handles(&self, _action: &Action) -> bool {
        false
    }

    /// Apply a queued action this system `handles`.
    fn on_action(&mut self, _action: &Action, _data: &mut EngineData) -> SimResult<()> {
        Ok(())
    }

    fn pre_process(&mut self, data: &mut EngineData) -> SimResult<()>;

    fn process(&mut self, _data: &mut EngineData) -> SimResult<()> {
        Ok(())
    }

    fn post_process(&mut self, data: &mut EngineData) -> SimResult<()>;

    /// State held by the system itself rather than in its networks, such
    /// as the actions it has applied. `None` when there is nothing to keep.
    fn save_state(&self) -> SimResult<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Take back what `save_state` produced. Cached coefficients are stale
    /// afterwards and recompute from the restored state.
    fn restore_state(&mut self, _state: &serde_json::Value) -> SimResult<()> {
        Ok(())
    }

    /// A named derived value, or `None` if this system does not know it.
    fn get_scalar(&self, _key: &str) -> Option<Real> {
        None
    }
}
