//! Shared state every system reads and stages into.

use pf_circuit::{
    Circuit, CircuitBuilder, Domain, Electrical, ElementKind, Fluid, SwitchState, Thermal,
};
use pf_compartment::{CompartmentGraph, Phase, SubstanceRegistry};
use pf_core::{Real, SubstanceId};
use tracing::debug;

use crate::actions::{ConditionSet, Stimulus};
use crate::config::EngineConfig;
use crate::error::{SimError, SimResult};

/// A compartment graph and the circuit it is laid over, if any.
#[derive(Debug, Clone)]
pub struct BoundGraph<D: Domain> {
    pub graph: CompartmentGraph<D>,
    pub circuit: Option<String>,
}

/// Every circuit and compartment graph of one domain.
#[derive(Debug, Clone)]
pub struct Network<D: Domain> {
    pub(crate) circuits: Vec<Circuit<D>>,
    pub(crate) graphs: Vec<BoundGraph<D>>,
}

impl<D: Domain> Default for Network<D> {
    fn default() -> Self {
        Self {
            circuits: Vec::new(),
            graphs: Vec::new(),
        }
    }
}

impl<D: Domain> Network<D> {
    pub fn circuits(&self) -> &[Circuit<D>] {
        &self.circuits
    }

    pub fn circuits_mut(&mut self) -> &mut [Circuit<D>] {
        &mut self.circuits
    }

    pub fn circuit(&self, name: &str) -> Option<&Circuit<D>> {
        self.circuits.iter().find(|c| c.name() == name)
    }

    pub fn circuit_mut(&mut self, name: &str) -> Option<&mut Circuit<D>> {
        self.circuits.iter_mut().find(|c| c.name() == name)
    }

    pub fn graphs(&self) -> &[BoundGraph<D>] {
        &self.graphs
    }

    pub fn graph(&self, name: &str) -> Option<&CompartmentGraph<D>> {
        self.graphs.iter().map(|b| &b.graph).find(|g| g.name() == name)
    }

    pub fn graph_mut(&mut self, name: &str) -> Option<&mut CompartmentGraph<D>> {
        self.graphs
            .iter_mut()
            .map(|b| &mut b.graph)
            .find(|g| g.name() == name)
    }

    /// Stage a stimulus if it targets one of this network's circuits.
    /// Returns `Ok(false)` when the circuit is not here.
    pub(crate) fn stage(&mut self, stimulus: &Stimulus) -> SimResult<bool> {
        let Some(circuit) = self.circuit_mut(stimulus.circuit()) else {
            return Ok(false);
        };
        match stimulus {
            Stimulus::PathValue { path, value, .. } => {
                let id = path_id(circuit, path)?;
                circuit.set_next_value(id, *value)?;
            }
            Stimulus::Switch { path, state, .. } => {
                let id = path_id(circuit, path)?;
                circuit.set_next_switch(id, SwitchState::from(*state))?;
            }
            Stimulus::NodePotential { node, value, .. } => {
                let id = circuit.node_by_name(node).ok_or_else(|| SimError::UnknownTarget {
                    what: "node",
                    name: node.clone(),
                })?;
                if !circuit.node(id).is_some_and(|n| n.is_reference()) {
                    return Err(SimError::InvalidAction {
                        what: format!("node '{node}' is solved, its potential cannot be imposed"),
                    });
                }
                circuit.set_next_potential(id, *value)?;
            }
        }
        Ok(true)
    }

    /// Check that a stimulus names an existing element of the right kind
    /// and carries a value that element accepts.
    pub(crate) fn check(&self, stimulus: &Stimulus) -> SimResult<bool> {
        let Some(circuit) = self.circuit(stimulus.circuit()) else {
            return Ok(false);
        };
        match stimulus {
            Stimulus::PathValue { path, value, .. } => {
                circuit.check_next_value(path_id(circuit, path)?, *value)?;
            }
            Stimulus::Switch { path, .. } => {
                let id = path_id(circuit, path)?;
                if let Some(p) = circuit.path(id).filter(|p| p.kind != ElementKind::Switch) {
                    return Err(SimError::InvalidAction {
                        what: format!("path '{path}' is a {}, not a switch", p.kind.name()),
                    });
                }
            }
            Stimulus::NodePotential { node, value, .. } => {
                if !value.is_finite() {
                    return Err(SimError::InvalidAction {
                        what: format!("potential {value} for node '{node}'"),
                    });
                }
                let id = circuit.node_by_name(node).ok_or_else(|| SimError::UnknownTarget {
                    what: "node",
                    name: node.clone(),
                })?;
                if !circuit.node(id).is_some_and(|n| n.is_reference()) {
                    return Err(SimError::InvalidAction {
                        what: format!("node '{node}' is solved, its potential cannot be imposed"),
                    });
                }
            }
        }
        Ok(true)
    }

    fn solve_all(&mut self, dt: Real, config: &EngineConfig) -> SimResult<()> {
        let options = config.solve_options();
        for circuit in &mut self.circuits {
            let report = circuit.solve(dt, &options)?;
            debug!(circuit = circuit.name(), passes = report.passes, "solved");
        }
        Ok(())
    }

    fn commit_all(&mut self) {
        for circuit in &mut self.circuits {
            circuit.commit();
        }
    }

    fn clear_all(&mut self) {
        for circuit in &mut self.circuits {
            circuit.clear();
        }
    }

    /// Pull committed circuit values into bound graphs, then move substances.
    fn transport_all(&mut self, dt: Real) -> SimResult<()> {
        for bound in &mut self.graphs {
            if let Some(name) = &bound.circuit {
                let circuit = self
                    .circuits
                    .iter()
                    .find(|c| c.name() == name)
                    .ok_or_else(|| SimError::UnknownTarget {
                        what: "circuit",
                        name: name.clone(),
                    })?;
                bound.graph.sync_from_circuit(circuit)?;
            }
            bound.graph.transport(dt)?;
        }
        Ok(())
    }
}

fn path_id<D: Domain>(circuit: &Circuit<D>, path: &str) -> SimResult<pf_core::PathId> {
    circuit.path_by_name(path).ok_or_else(|| SimError::UnknownTarget {
        what: "path",
        name: format!("{}.{path}", circuit.name()),
    })
}

/// The per-domain networks.
#[derive(Debug, Clone, Default)]
pub struct Networks {
    pub fluid: Network<Fluid>,
    pub thermal: Network<Thermal>,
    pub electrical: Network<Electrical>,
}

/// Selects a domain's network so engine code can stay generic.
pub trait NetworkDomain: Domain {
    fn network(networks: &Networks) -> &Network<Self>;
    fn network_mut(networks: &mut Networks) -> &mut Network<Self>;
}

impl NetworkDomain for Fluid {
    fn network(networks: &Networks) -> &Network<Self> {
        &networks.fluid
    }
    fn network_mut(networks: &mut Networks) -> &mut Network<Self> {
        &mut networks.fluid
    }
}

impl NetworkDomain for Thermal {
    fn network(networks: &Networks) -> &Network<Self> {
        &networks.thermal
    }
    fn network_mut(networks: &mut Networks) -> &mut Network<Self> {
        &mut networks.thermal
    }
}

impl NetworkDomain for Electrical {
    fn network(networks: &Networks) -> &Network<Self> {
        &networks.electrical
    }
    fn network_mut(networks: &mut Networks) -> &mut Network<Self> {
        &mut networks.electrical
    }
}

impl Networks {
    pub(crate) fn solve_all(&mut self, dt: Real, config: &EngineConfig) -> SimResult<()> {
        self.fluid.solve_all(dt, config)?;
        self.thermal.solve_all(dt, config)?;
        self.electrical.solve_all(dt, config)
    }

    pub(crate) fn commit_all(&mut self) {
        self.fluid.commit_all();
        self.thermal.commit_all();
        self.electrical.commit_all();
    }

    pub(crate) fn clear_all(&mut self) {
        self.fluid.clear_all();
        self.thermal.clear_all();
        self.electrical.clear_all();
    }

    pub(crate) fn transport_all(&mut self, dt: Real) -> SimResult<()> {
        self.fluid.transport_all(dt)?;
        self.thermal.transport_all(dt)?;
        self.electrical.transport_all(dt)
    }

    pub(crate) fn stage(&mut self, stimulus: &Stimulus) -> SimResult<()> {
        if self.fluid.stage(stimulus)?
            || self.thermal.stage(stimulus)?
            || self.electrical.stage(stimulus)?
        {
            return Ok(());
        }
        Err(unknown_circuit(stimulus))
    }

    pub(crate) fn check(&self, stimulus: &Stimulus) -> SimResult<()> {
        if self.fluid.check(stimulus)?
            || self.thermal.check(stimulus)?
            || self.electrical.check(stimulus)?
        {
            return Ok(());
        }
        Err(unknown_circuit(stimulus))
    }

    fn has_circuit(&self, name: &str) -> bool {
        self.fluid.circuit(name).is_some()
            || self.thermal.circuit(name).is_some()
            || self.electrical.circuit(name).is_some()
    }

    fn has_graph(&self, name: &str) -> bool {
        self.fluid.graph(name).is_some()
            || self.thermal.graph(name).is_some()
            || self.electrical.graph(name).is_some()
    }
}

fn unknown_circuit(stimulus: &Stimulus) -> SimError {
    SimError::UnknownTarget {
        what: "circuit",
        name: stimulus.circuit().to_string(),
    }
}

/// Everything systems share: configuration, networks, substances,
/// conditions and the clock.
#[derive(Debug, Clone)]
pub struct EngineData {
    pub config: EngineConfig,
    pub networks: Networks,
    pub substances: SubstanceRegistry,
    pub conditions: ConditionSet,
    pub(crate) time_s: Real,
    pub(crate) step: u64,
    pub(crate) state_generation: u64,
}

impl EngineData {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config,
            networks: Networks::default(),
            substances: SubstanceRegistry::new(),
            conditions: ConditionSet::default(),
            time_s: 0.0,
            step: 0,
            state_generation: 0,
        }
    }

    pub fn time_s(&self) -> Real {
        self.time_s
    }

    pub fn dt_s(&self) -> Real {
        self.config.dt_s
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Bumped by `state_change`; caches keyed on it recompute lazily.
    pub fn state_generation(&self) -> u64 {
        self.state_generation
    }

    /// Mark every generation-cached value stale.
    pub fn state_change(&mut self) {
        self.state_generation += 1;
        debug!(generation = self.state_generation, "state change");
    }

    /// Start a circuit with the configured switch resistances for `D`.
    pub fn circuit_builder<D: Domain>(&self, name: impl Into<String>) -> CircuitBuilder<D> {
        CircuitBuilder::new(name).with_switch_resistances(self.config.switch_resistances::<D>())
    }

    /// Register a built circuit. Circuit names are unique across domains.
    pub fn add_circuit<D: NetworkDomain>(&mut self, circuit: Circuit<D>) -> SimResult<()> {
        if self.networks.has_circuit(circuit.name()) {
            return Err(SimError::InvalidConfig {
                what: format!("duplicate circuit '{}'", circuit.name()),
            });
        }
        D::network_mut(&mut self.networks).circuits.push(circuit);
        Ok(())
    }

    /// Register a compartment graph, optionally laid over a circuit of the
    /// same domain. Active substances of the graph's phase are activated in it.
    pub fn add_graph<D: NetworkDomain>(
        &mut self,
        mut graph: CompartmentGraph<D>,
        circuit: Option<&str>,
    ) -> SimResult<()> {
        if self.networks.has_graph(graph.name()) {
            return Err(SimError::InvalidConfig {
                what: format!("duplicate graph '{}'", graph.name()),
            });
        }
        if let Some(name) = circuit {
            if D::network(&self.networks).circuit(name).is_none() {
                return Err(SimError::UnknownTarget {
                    what: "circuit",
                    name: name.to_string(),
                });
            }
        }
        if let Some(phase) = graph.phase() {
            for substance in self.substances.active().filter(|s| s.phase == phase) {
                graph.activate_substance(substance)?;
            }
        }
        D::network_mut(&mut self.networks).graphs.push(BoundGraph {
            graph,
            circuit: circuit.map(str::to_string),
        });
        Ok(())
    }

    /// Lay an already registered graph over a circuit of the same domain.
    pub fn bind_graph<D: NetworkDomain>(&mut self, graph: &str, circuit: &str) -> SimResult<()> {
        let network = D::network_mut(&mut self.networks);
        if network.circuit(circuit).is_none() {
            return Err(SimError::UnknownTarget {
                what: "circuit",
                name: circuit.to_string(),
            });
        }
        let bound = network
            .graphs
            .iter_mut()
            .find(|b| b.graph.name() == graph)
            .ok_or_else(|| SimError::UnknownTarget {
                what: "graph",
                name: graph.to_string(),
            })?;
        bound.circuit = Some(circuit.to_string());
        Ok(())
    }

    pub fn circuit<D: NetworkDomain>(&self, name: &str) -> Option<&Circuit<D>> {
        D::network(&self.networks).circuit(name)
    }

    pub fn circuit_mut<D: NetworkDomain>(&mut self, name: &str) -> Option<&mut Circuit<D>> {
        D::network_mut(&mut self.networks).circuit_mut(name)
    }

    pub fn graph<D: NetworkDomain>(&self, name: &str) -> Option<&CompartmentGraph<D>> {
        D::network(&self.networks).graph(name)
    }

    pub fn graph_mut<D: NetworkDomain>(&mut self, name: &str) -> Option<&mut CompartmentGraph<D>> {
        D::network_mut(&mut self.networks).graph_mut(name)
    }

    /// Register (if needed) and activate a substance everywhere it can live.
    pub fn activate_substance(&mut self, name: &str, phase: Phase) -> SimResult<SubstanceId> {
        let id = match self.substances.by_name(name) {
            Some(s) if s.phase != phase => {
                return Err(SimError::InvalidConfig {
                    what: format!("substance '{name}' is {}, not {}", s.phase.name(), phase.name()),
                });
            }
            Some(s) => s.id,
            None => self.substances.register(name, phase)?,
        };
        if self.substances.activate(id)? {
            debug!(substance = name, "substance activated");
        }
        let Some(substance) = self.substances.get(id).cloned() else {
            return Err(SimError::UnknownTarget {
                what: "substance",
                name: name.to_string(),
            });
        };
        for bound in &mut self.networks.fluid.graphs {
            if bound.graph.phase() == Some(phase) {
                bound.graph.activate_substance(&substance)?;
            }
        }
        Ok(id)
    }
}
