//! The stepping engine.

use pf_circuit::{Circuit, Domain};
use pf_compartment::CompartmentGraph;
use pf_core::Real;
use tracing::{debug, error, info};

use crate::actions::{Action, Condition};
use crate::config::EngineConfig;
use crate::data::{EngineData, Network};
use crate::error::{SimError, SimResult};
use crate::snapshot::{EngineSnapshot, SystemSnapshot};
use crate::system::PhysiologySystem;

/// Summary of one completed step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub step: u64,
    pub time_s: Real,
    pub actions_applied: usize,
}

/// Owns the systems and their shared data and advances them in lock-step.
pub struct Engine {
    data: EngineData,
    systems: Vec<Box<dyn PhysiologySystem>>,
    pending: Vec<Action>,
    initialized: bool,
    halted: Option<String>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            data: EngineData::new(config),
            systems: Vec::new(),
            pending: Vec::new(),
            initialized: false,
            halted: None,
        })
    }

    /// Register a system. Systems run in registration order.
    pub fn add_system(&mut self, system: impl PhysiologySystem + 'static) -> SimResult<()> {
        if self.initialized {
            return Err(SimError::InvalidConfig {
                what: format!("system '{}' added after initialization", system.name()),
            });
        }
        if self.systems.iter().any(|s| s.name() == system.name()) {
            return Err(SimError::InvalidConfig {
                what: format!("duplicate system '{}'", system.name()),
            });
        }
        self.systems.push(Box::new(system));
        Ok(())
    }

    /// Add a persistent condition. Only allowed before `initialize`.
    pub fn add_condition(&mut self, condition: Condition) -> SimResult<()> {
        if self.initialized {
            return Err(SimError::InvalidAction {
                what: format!("{} condition after initialization", condition.kind()),
            });
        }
        self.data.conditions.add(condition)
    }

    /// Let every system build its networks, then stabilize for the
    /// configured time and restart the clock.
    pub fn initialize(&mut self) -> SimResult<()> {
        if self.initialized {
            return Err(SimError::InvalidAction {
                what: "engine already initialized".to_string(),
            });
        }
        for system in &mut self.systems {
            system.initialize(&mut self.data)?;
            debug!(system = system.name(), "system initialized");
        }
        self.initialized = true;
        self.data.state_change();

        let stabilization = self.data.config.stabilization_time_s;
        let steps = self.stabilize(stabilization)?;
        self.data.time_s = 0.0;
        self.data.step = 0;
        info!(
            systems = self.systems.len(),
            stabilization_steps = steps,
            "engine initialized"
        );
        Ok(())
    }

    /// Reset circuit scalars to their built baseline and run steps
    /// covering `duration_s`. Returns the number of steps run.
    pub fn stabilize(&mut self, duration_s: Real) -> SimResult<usize> {
        self.ensure_running()?;
        self.data.networks.clear_all();
        self.data.state_change();
        let steps = self.data.config.steps_for(duration_s);
        for _ in 0..steps {
            self.step()?;
        }
        debug!(steps, duration_s, "stabilized");
        Ok(steps)
    }

    /// Queue an action for the start of the next step. Unknown targets and
    /// values the target would reject are refused here, without halting.
    pub fn queue_action(&mut self, action: Action) -> SimResult<()> {
        self.ensure_running()?;
        match &action {
            Action::Stimulus(stimulus) => self.data.networks.check(stimulus)?,
            other => {
                if !self.systems.iter().any(|s| s.handles(other)) {
                    return Err(SimError::UnknownTarget {
                        what: "system for action",
                        name: other.kind().to_string(),
                    });
                }
            }
        }
        self.pending.push(action);
        Ok(())
    }

    /// Advance by one time step. Any error halts the engine and discards
    /// the step: circuits and graphs keep the values of the last completed
    /// step, and later calls return `SimError::Halted`.
    pub fn step(&mut self) -> SimResult<StepReport> {
        self.ensure_running()?;
        let checkpoint = self.data.networks.clone();
        match self.run_step() {
            Ok(report) => Ok(report),
            Err(err) => {
                self.data.networks = checkpoint;
                error!(
                    step = self.data.step,
                    severity = ?err.severity(),
                    error = %err,
                    "step failed, engine halted"
                );
                self.halted = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Run whole steps covering `duration_s`.
    pub fn advance(&mut self, duration_s: Real) -> SimResult<usize> {
        let steps = self.data.config.steps_for(duration_s);
        for _ in 0..steps {
            self.step()?;
        }
        Ok(steps)
    }

    fn run_step(&mut self) -> SimResult<StepReport> {
        let dt = self.data.config.dt_s;
        let actions = std::mem::take(&mut self.pending);
        for action in &actions {
            self.apply_action(action)?;
        }

        for system in &mut self.systems {
            system.pre_process(&mut self.data)?;
        }
        self.data.networks.solve_all(dt, &self.data.config)?;
        for system in &mut self.systems {
            system.process(&mut self.data)?;
        }
        self.data.networks.commit_all();
        self.data.networks.transport_all(dt)?;
        for system in &mut self.systems {
            system.post_process(&mut self.data)?;
        }

        self.data.time_s += dt;
        self.data.step += 1;
        Ok(StepReport {
            step: self.data.step,
            time_s: self.data.time_s,
            actions_applied: actions.len(),
        })
    }

    fn apply_action(&mut self, action: &Action) -> SimResult<()> {
        debug!(kind = action.kind(), "applying action");
        if let Action::Stimulus(stimulus) = action {
            return self.data.networks.stage(stimulus);
        }
        for system in self.systems.iter_mut().filter(|s| s.handles(action)) {
            system.on_action(action, &mut self.data)?;
        }
        Ok(())
    }

    fn ensure_running(&self) -> SimResult<()> {
        if let Some(reason) = &self.halted {
            return Err(SimError::Halted {
                reason: reason.clone(),
            });
        }
        if !self.initialized {
            return Err(SimError::NotInitialized);
        }
        Ok(())
    }

    /// Mark cached coefficients stale; they recompute in the next
    /// `pre_process`.
    pub fn state_change(&mut self) {
        self.data.state_change();
    }

    pub fn data(&self) -> &EngineData {
        &self.data
    }

    /// Direct access for drivers and tests. Changes made here bypass the
    /// action queue.
    pub fn data_mut(&mut self) -> &mut EngineData {
        &mut self.data
    }

    pub fn time_s(&self) -> Real {
        self.data.time_s
    }

    pub fn step_count(&self) -> u64 {
        self.data.step
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn pending_actions(&self) -> &[Action] {
        &self.pending
    }

    pub fn system(&self, name: &str) -> Option<&dyn PhysiologySystem> {
        self.systems
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Look up a named scalar.
    ///
    /// The first dotted segment selects a system, a compartment graph or a
    /// circuit, tried in that order:
    /// - `Environment.TotalHeatLoss`
    /// - `Respiratory.Alveoli.Oxygen.VolumeFraction`
    /// - `Respiratory.Alveoli.Pressure`, `Respiratory.LowerAirway.Flow`
    pub fn get_scalar(&self, name: &str) -> Option<Real> {
        let (head, rest) = name.split_once('.')?;
        let networks = &self.data.networks;
        self.system(head)
            .and_then(|s| s.get_scalar(rest))
            .or_else(|| network_scalar(&networks.fluid, head, rest))
            .or_else(|| network_scalar(&networks.thermal, head, rest))
            .or_else(|| network_scalar(&networks.electrical, head, rest))
    }

    /// Copy of every committed scalar, the conditions, and whatever state
    /// each system keeps for itself.
    pub fn snapshot(&self) -> SimResult<EngineSnapshot> {
        let mut snapshot = EngineSnapshot::capture(&self.data);
        for system in &self.systems {
            if let Some(state) = system.save_state()? {
                snapshot.systems.push(SystemSnapshot {
                    name: system.name().to_string(),
                    state,
                });
            }
        }
        Ok(snapshot)
    }

    /// Overwrite committed state from a snapshot taken on an engine
    /// assembled the same way. Pending actions are dropped and cached
    /// coefficients go stale. On failure the engine is left as it was.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> SimResult<()> {
        self.ensure_running()?;
        self.check_systems(snapshot)?;
        let previous = self.snapshot()?;
        snapshot.apply(&mut self.data)?;
        if let Err(err) = self.restore_systems(snapshot) {
            previous.apply(&mut self.data)?;
            self.restore_systems(&previous)?;
            return Err(err);
        }
        self.pending.clear();
        debug!(
            time_s = self.data.time_s,
            step = self.data.step,
            "snapshot restored"
        );
        Ok(())
    }

    fn check_systems(&self, snapshot: &EngineSnapshot) -> SimResult<()> {
        for saved in &snapshot.systems {
            if self.system(&saved.name).is_none() {
                return Err(SimError::SnapshotMismatch {
                    what: format!("no system '{}'", saved.name),
                });
            }
        }
        for system in &self.systems {
            if system.save_state()?.is_some() && snapshot.system(system.name()).is_none() {
                return Err(SimError::SnapshotMismatch {
                    what: format!("snapshot has no state for system '{}'", system.name()),
                });
            }
        }
        Ok(())
    }

    fn restore_systems(&mut self, snapshot: &EngineSnapshot) -> SimResult<()> {
        for system in &mut self.systems {
            if let Some(state) = snapshot.system(system.name()) {
                system.restore_state(state)?;
            }
        }
        Ok(())
    }
}

fn network_scalar<D: Domain>(network: &Network<D>, head: &str, rest: &str) -> Option<Real> {
    network
        .graph(head)
        .and_then(|g| graph_scalar(g, rest))
        .or_else(|| network.circuit(head).and_then(|c| circuit_scalar(c, rest)))
}

fn graph_scalar<D: Domain>(graph: &CompartmentGraph<D>, rest: &str) -> Option<Real> {
    let (compartment, key) = rest.split_once('.')?;
    let id = graph.compartment_by_name(compartment)?;
    graph.get_scalar(id, key)
}

fn circuit_scalar<D: Domain>(circuit: &Circuit<D>, rest: &str) -> Option<Real> {
    let (element, field) = rest.split_once('.')?;
    let kind = D::KIND;
    if let Some(node) = circuit.node_by_name(element).and_then(|id| circuit.node(id)) {
        return match field {
            "Potential" => node.potential(),
            "Quantity" => node.quantity(),
            f if f == kind.potential_name() => node.potential(),
            f if f == kind.quantity_name() => node.quantity(),
            _ => None,
        };
    }
    let path = circuit.path_by_name(element).and_then(|id| circuit.path(id))?;
    match field {
        "Flow" => path.flow(),
        "Value" => path.value(),
        _ => None,
    }
}
