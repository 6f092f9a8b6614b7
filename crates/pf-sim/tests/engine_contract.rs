//! Integration test: the three-phase step contract on an electrical circuit.
//!
//! Network: Ground --[Battery]--> Cell --[Key]--> Bulb --[Filament]--> Ground
//!
//! Test that demonstrates:
//! - A system builds and registers its own circuit
//! - PreProcess sees only committed values, never another system's staging
//! - Stimuli reach named circuit elements; bad targets are refused
//! - Generation-cached coefficients recompute only after a state change
//! - Any failure inside a step halts the engine and discards the step

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pf_circuit::{Domain, Electrical, SwitchState};
use pf_core::{PathId, PfError, Real, Severity};
use pf_sim::{
    Action, Condition, Engine, EngineConfig, EngineData, GenerationCache, PhysiologySystem,
    SimError, SimResult, Stimulus, SwitchCommand,
};

/// A battery lighting a bulb through a key switch.
struct Lamp {
    filament_ohms: Real,
    filament: Option<PathId>,
    resistance: GenerationCache<Real>,
    computes: Arc<AtomicUsize>,
    current: Option<Real>,
}

impl Lamp {
    fn new(filament_ohms: Real) -> Self {
        Self {
            filament_ohms,
            filament: None,
            resistance: GenerationCache::new(),
            computes: Arc::new(AtomicUsize::new(0)),
            current: None,
        }
    }
}

impl PhysiologySystem for Lamp {
    fn name(&self) -> &str {
        "Lamp"
    }

    fn initialize(&mut self, data: &mut EngineData) -> SimResult<()> {
        let mut b = data.circuit_builder::<Electrical>("Lamp");
        let ground = b.add_reference_node("Ground", Some(0.0));
        let cell = b.add_node("Cell");
        let bulb = b.add_node("Bulb");
        b.add_potential_source("Battery", ground, cell, 12.0);
        b.add_switch("Key", cell, bulb, SwitchState::Closed);
        self.filament = Some(b.add_resistor("Filament", bulb, ground, 6.0));
        data.add_circuit(b.build()?)
    }

    fn pre_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let ohms = self.filament_ohms;
        let computes = &self.computes;
        let r = *self
            .resistance
            .get_or_try_update(data.state_generation(), || {
                computes.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SimError>(ohms)
            })?;
        let filament = self.filament.ok_or(SimError::NotInitialized)?;
        data.circuit_mut::<Electrical>("Lamp")
            .ok_or(SimError::NotInitialized)?
            .set_next_value(filament, r)?;
        Ok(())
    }

    fn post_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let circuit = data
            .circuit::<Electrical>("Lamp")
            .ok_or(SimError::NotInitialized)?;
        self.current = self
            .filament
            .and_then(|f| circuit.path(f))
            .and_then(|p| p.flow());
        Ok(())
    }

    fn get_scalar(&self, key: &str) -> Option<Real> {
        match key {
            "Current" => self.current,
            _ => None,
        }
    }
}

/// Records the committed filament resistance it sees in PreProcess.
struct Observer {
    seen: Arc<Mutex<Vec<Option<Real>>>>,
}

impl PhysiologySystem for Observer {
    fn name(&self) -> &str {
        "Observer"
    }

    fn initialize(&mut self, _data: &mut EngineData) -> SimResult<()> {
        Ok(())
    }

    fn pre_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let circuit = data
            .circuit::<Electrical>("Lamp")
            .ok_or(SimError::NotInitialized)?;
        let value = circuit
            .path_by_name("Filament")
            .and_then(|id| circuit.path(id))
            .and_then(|p| p.value());
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(value);
        }
        Ok(())
    }

    fn post_process(&mut self, _data: &mut EngineData) -> SimResult<()> {
        Ok(())
    }
}

/// Fails its post-process on the given call.
struct Fuse {
    blow_on: usize,
    calls: usize,
}

impl PhysiologySystem for Fuse {
    fn name(&self) -> &str {
        "Fuse"
    }

    fn initialize(&mut self, _data: &mut EngineData) -> SimResult<()> {
        Ok(())
    }

    fn pre_process(&mut self, _data: &mut EngineData) -> SimResult<()> {
        Ok(())
    }

    fn post_process(&mut self, _data: &mut EngineData) -> SimResult<()> {
        self.calls += 1;
        if self.calls == self.blow_on {
            return Err(PfError::Invariant {
                what: "fuse blown".into(),
            }
            .into());
        }
        Ok(())
    }
}

fn fused_lamp_engine(blow_on: usize) -> Engine {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.add_system(Lamp::new(6.0)).unwrap();
    engine.add_system(Fuse { blow_on, calls: 0 }).unwrap();
    engine.initialize().unwrap();
    engine
}

fn lamp_engine(filament_ohms: Real) -> Engine {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.add_system(Lamp::new(filament_ohms)).unwrap();
    engine.initialize().unwrap();
    engine
}

fn switch(state: SwitchCommand) -> Action {
    Action::Stimulus(Stimulus::Switch {
        circuit: "Lamp".into(),
        path: "Key".into(),
        state,
    })
}

#[test]
fn electrical_system_follows_ohms_law() {
    let mut engine = lamp_engine(3.0);
    let report = engine.step().unwrap();
    assert_eq!(report.step, 1);
    assert!((report.time_s - 0.02).abs() < 1e-12);

    let current = engine.get_scalar("Lamp.Current").unwrap();
    // closed switch adds a small series resistance
    let expected = 12.0 / (3.0 + Electrical::CLOSED_RESISTANCE);
    assert!((current - expected).abs() < 1e-9, "current {current}");
}

#[test]
fn pre_process_sees_only_committed_values() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.add_system(Lamp::new(3.0)).unwrap();
    engine
        .add_system(Observer {
            seen: Arc::clone(&seen),
        })
        .unwrap();
    engine.initialize().unwrap();

    engine.step().unwrap();
    engine.step().unwrap();
    // Lamp staged 3 ohms before Observer ran, but Observer still read the
    // committed baseline during the first step.
    assert_eq!(*seen.lock().unwrap(), vec![Some(6.0), Some(3.0)]);
}

#[test]
fn switch_stimulus_opens_the_circuit() {
    let mut engine = lamp_engine(6.0);
    engine.step().unwrap();
    assert!(engine.get_scalar("Lamp.Current").unwrap() > 1.9);

    engine.queue_action(switch(SwitchCommand::Open)).unwrap();
    assert_eq!(engine.pending_actions().len(), 1);
    let report = engine.step().unwrap();
    assert_eq!(report.actions_applied, 1);
    assert!(engine.get_scalar("Lamp.Current").unwrap().abs() < 1e-90);

    engine.queue_action(switch(SwitchCommand::Closed)).unwrap();
    engine.step().unwrap();
    assert!(engine.get_scalar("Lamp.Current").unwrap() > 1.9);
}

#[test]
fn unknown_targets_are_refused_without_halting() {
    let mut engine = lamp_engine(6.0);
    let err = engine
        .queue_action(Action::Stimulus(Stimulus::PathValue {
            circuit: "Lamp".into(),
            path: "Nope".into(),
            value: 1.0,
        }))
        .unwrap_err();
    assert!(matches!(err, SimError::UnknownTarget { what: "path", .. }));
    assert_eq!(err.severity(), Severity::Recoverable);

    let err = engine
        .queue_action(Action::Stimulus(Stimulus::NodePotential {
            circuit: "Lamp".into(),
            node: "Cell".into(),
            value: 1.0,
        }))
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidAction { .. }));

    let err = engine
        .queue_action(Action::ThermalApplication(Default::default()))
        .unwrap_err();
    assert!(matches!(err, SimError::UnknownTarget { .. }));

    assert!(engine.pending_actions().is_empty());
    engine.step().unwrap();
    assert!(!engine.is_halted());
}

#[test]
fn scalars_route_to_systems_then_circuits() {
    let mut engine = lamp_engine(6.0);
    engine.step().unwrap();

    let by_system = engine.get_scalar("Lamp.Current").unwrap();
    let by_path = engine.get_scalar("Lamp.Filament.Flow").unwrap();
    assert_eq!(by_system, by_path);
    assert_eq!(engine.get_scalar("Lamp.Filament.Value"), Some(6.0));
    assert!((engine.get_scalar("Lamp.Cell.Voltage").unwrap() - 12.0).abs() < 1e-9);
    assert_eq!(
        engine.get_scalar("Lamp.Cell.Voltage"),
        engine.get_scalar("Lamp.Cell.Potential")
    );
    assert_eq!(engine.get_scalar("Lamp.Cell.Pressure"), None);
    assert_eq!(engine.get_scalar("Lamp.Missing.Flow"), None);
    assert_eq!(engine.get_scalar("Lamp"), None);
    assert_eq!(engine.get_scalar("Nothing.Here"), None);
}

#[test]
fn cached_coefficients_recompute_after_state_change() {
    let lamp = Lamp::new(6.0);
    let computes = Arc::clone(&lamp.computes);
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.add_system(lamp).unwrap();
    engine.initialize().unwrap();

    for _ in 0..3 {
        engine.step().unwrap();
    }
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    engine.state_change();
    engine.step().unwrap();
    engine.step().unwrap();
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}

#[test]
fn bad_values_are_refused_without_halting() {
    let mut engine = lamp_engine(6.0);
    let path_value = |path: &str, value: Real| {
        Action::Stimulus(Stimulus::PathValue {
            circuit: "Lamp".into(),
            path: path.into(),
            value,
        })
    };
    let refused = [
        path_value("Battery", Real::NAN),
        path_value("Filament", 0.0),
        path_value("Filament", -2.0),
        Action::Stimulus(Stimulus::Switch {
            circuit: "Lamp".into(),
            path: "Filament".into(),
            state: SwitchCommand::Open,
        }),
        Action::Stimulus(Stimulus::NodePotential {
            circuit: "Lamp".into(),
            node: "Ground".into(),
            value: Real::INFINITY,
        }),
    ];
    for action in refused {
        let err = engine.queue_action(action.clone()).unwrap_err();
        assert_eq!(err.severity(), Severity::Recoverable, "{action:?}: {err}");
    }

    assert!(engine.pending_actions().is_empty());
    engine.step().unwrap();
    assert!(!engine.is_halted());
    assert!(engine.get_scalar("Lamp.Current").unwrap() > 1.9);
}

#[test]
fn failed_step_halts_the_engine() {
    let mut engine = fused_lamp_engine(1);
    let steps_before = engine.step_count();
    let err = engine.step().unwrap_err();
    assert_eq!(err.severity(), Severity::Fatal);
    assert!(engine.is_halted());
    assert_eq!(engine.step_count(), steps_before);

    match engine.step() {
        Err(SimError::Halted { reason }) => assert!(reason.contains("fuse blown"), "{reason}"),
        other => panic!("expected Halted, got {other:?}"),
    }
    assert!(matches!(
        engine.queue_action(switch(SwitchCommand::Open)),
        Err(SimError::Halted { .. })
    ));
}

#[test]
fn failed_step_is_discarded() {
    let mut engine = fused_lamp_engine(2);
    engine.step().unwrap();
    let flow = engine.get_scalar("Lamp.Filament.Flow").unwrap();
    assert!(flow > 1.9);
    let before = engine.snapshot().unwrap();

    // the open key solves and commits before the fuse blows
    engine.queue_action(switch(SwitchCommand::Open)).unwrap();
    assert!(engine.step().is_err());
    assert!(engine.is_halted());

    assert_eq!(engine.step_count(), 1);
    assert_eq!(engine.get_scalar("Lamp.Filament.Flow"), Some(flow));
    assert_eq!(engine.snapshot().unwrap().circuits, before.circuits);
}

#[test]
fn lifecycle_is_enforced() {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.add_system(Lamp::new(6.0)).unwrap();
    assert!(matches!(engine.step(), Err(SimError::NotInitialized)));
    assert!(engine.add_system(Lamp::new(1.0)).is_err());

    engine
        .add_condition(Condition::AirwayObstruction { severity: 0.5 })
        .unwrap();
    let err = engine
        .add_condition(Condition::AirwayObstruction { severity: 0.2 })
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot have multiple Airway Obstruction conditions"
    );
    assert_eq!(err.severity(), Severity::Recoverable);

    engine.initialize().unwrap();
    assert!(engine.initialize().is_err());
    assert!(
        engine
            .add_condition(Condition::InitialEnvironment(Default::default()))
            .is_err()
    );
    assert_eq!(engine.data().conditions.airway_obstruction(), Some(0.5));
}

#[test]
fn stabilization_restarts_the_clock() {
    let config = EngineConfig {
        stabilization_time_s: 1.0,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config).unwrap();
    engine.add_system(Lamp::new(6.0)).unwrap();
    engine.initialize().unwrap();
    assert_eq!(engine.step_count(), 0);
    assert_eq!(engine.time_s(), 0.0);
    // stabilization already committed a solved state
    assert!(engine.get_scalar("Lamp.Current").unwrap() > 1.9);

    assert_eq!(engine.advance(0.1).unwrap(), 5);
    assert_eq!(engine.step_count(), 5);
}
