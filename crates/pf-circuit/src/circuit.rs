//! The circuit: a validated, fixed-topology network for one domain.

use core::marker::PhantomData;
use std::collections::HashMap;

use pf_core::{NodeId, PathId, Real};

use crate::calculator::{self, SolveOptions, SolveReport};
use crate::domain::{Domain, Electrical, Fluid, SwitchResistances, Thermal};
use crate::element::{ElementKind, Node, Path, SwitchState};
use crate::error::{CircuitError, CircuitResult};
use crate::validate;

pub type FluidCircuit = Circuit<Fluid>;
pub type ThermalCircuit = Circuit<Thermal>;
pub type ElectricalCircuit = Circuit<Electrical>;

/// Nodes and paths of one physical domain.
///
/// The circuit stores:
/// - All nodes and paths in vectors (indexed by their IDs)
/// - Compact adjacency: for each node, which paths are incident
/// - Name lookups for stimulus injection and reporting
///
/// Topology is fixed once built; only scalar values change during a run.
#[derive(Debug, Clone)]
pub struct Circuit<D: Domain> {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) paths: Vec<Path>,

    /// Node i's paths are in node_paths[node_path_offsets[i]..node_path_offsets[i+1]].
    pub(crate) node_path_offsets: Vec<usize>,
    pub(crate) node_paths: Vec<PathId>,

    pub(crate) node_names: HashMap<String, NodeId>,
    pub(crate) path_names: HashMap<String, PathId>,
    pub(crate) resistances: SwitchResistances,
    pub(crate) _domain: PhantomData<D>,
}

impl<D: Domain> Circuit<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resistances(&self) -> SwitchResistances {
        self.resistances
    }

    /// Return all nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return all paths.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.slot())
    }

    pub fn path(&self, id: PathId) -> Option<&Path> {
        self.paths.get(id.slot())
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).copied()
    }

    pub fn path_by_name(&self, name: &str) -> Option<PathId> {
        self.path_names.get(name).copied()
    }

    /// Paths incident to a node.
    pub fn node_paths(&self, node_id: NodeId) -> &[PathId] {
        let idx = node_id.slot();
        if idx >= self.nodes.len() {
            return &[];
        }
        &self.node_paths[self.node_path_offsets[idx]..self.node_path_offsets[idx + 1]]
    }

    /// Check a value `set_next_value` would accept, without staging it.
    pub fn check_next_value(&self, path: PathId, value: Real) -> CircuitResult<()> {
        let p = self.path_checked(path)?;
        validate::check_element_value(&self.name, p, value)
    }

    /// Stage a resistance, capacitance or source value on a path.
    pub fn set_next_value(&mut self, path: PathId, value: Real) -> CircuitResult<()> {
        self.check_next_value(path, value)?;
        self.paths[path.slot()].value.set_next(value);
        Ok(())
    }

    /// Stage a switch state. Only valid on switches; valve states belong
    /// to the solver.
    pub fn set_next_switch(&mut self, path: PathId, state: SwitchState) -> CircuitResult<()> {
        let p = self.path_checked(path)?;
        if p.kind != ElementKind::Switch {
            return Err(CircuitError::ElementMismatch {
                circuit: self.name.clone(),
                path: p.name.clone(),
                expected: ElementKind::Switch.name(),
                actual: p.kind.name(),
            });
        }
        self.paths[path.slot()].state.set_next(state);
        Ok(())
    }

    /// Stage the imposed potential of a reference node.
    pub fn set_next_potential(&mut self, node: NodeId, value: Real) -> CircuitResult<()> {
        if !value.is_finite() {
            return Err(CircuitError::NonFinite {
                circuit: self.name.clone(),
                what: "staged potential".to_string(),
            });
        }
        let name = self.name.clone();
        let n = self.nodes.get_mut(node.slot()).ok_or(CircuitError::NotFound {
            circuit: name,
            what: "node",
            name: node.to_string(),
        })?;
        n.set_next_potential(value);
        Ok(())
    }

    /// Typed committed potential.
    pub fn potential(&self, node: NodeId) -> Option<D::Potential> {
        self.node(node)?.potential().map(D::potential)
    }

    /// Typed committed flow.
    pub fn flux(&self, path: PathId) -> Option<D::Flux> {
        self.path(path)?.flow().map(D::flux)
    }

    /// Typed committed stored quantity.
    pub fn quantity(&self, node: NodeId) -> Option<D::Quantity> {
        self.node(node)?.quantity().map(D::quantity)
    }

    /// Stage a source value given in domain units.
    pub fn set_next_potential_source(
        &mut self,
        path: PathId,
        rise: D::Potential,
    ) -> CircuitResult<()> {
        self.expect_kind(path, ElementKind::PotentialSource)?;
        self.set_next_value(path, D::potential_value(rise))
    }

    /// Stage a flow source given in domain units.
    pub fn set_next_flow_source(&mut self, path: PathId, flow: D::Flux) -> CircuitResult<()> {
        self.expect_kind(path, ElementKind::FlowSource)?;
        self.set_next_value(path, D::flux_value(flow))
    }

    /// Solve for next potentials and flows from the staged values.
    pub fn solve(&mut self, dt: Real, options: &SolveOptions) -> CircuitResult<SolveReport> {
        calculator::solve(self, dt, options)
    }

    /// Promote every staged value of every node and path.
    pub fn commit(&mut self) {
        for node in &mut self.nodes {
            node.commit();
        }
        for path in &mut self.paths {
            path.commit();
        }
    }

    /// Reset every scalar to its built baseline. Topology is untouched.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.clear();
        }
        for path in &mut self.paths {
            path.clear();
        }
    }

    /// Signed committed flow into a node minus flow out of it.
    pub fn net_inflow(&self, node: NodeId) -> Real {
        self.node_paths(node)
            .iter()
            .filter_map(|&pid| self.path(pid))
            .map(|p| {
                let q = p.flow().unwrap_or(0.0);
                if p.target == node { q } else { -q }
            })
            .sum()
    }

    /// Overwrite committed node values (used when restoring a snapshot).
    pub fn restore_node(
        &mut self,
        node: NodeId,
        potential: Option<Real>,
        quantity: Option<Real>,
    ) -> CircuitResult<()> {
        let name = self.name.clone();
        let n = self.nodes.get_mut(node.slot()).ok_or(CircuitError::NotFound {
            circuit: name,
            what: "node",
            name: node.to_string(),
        })?;
        n.restore(potential, quantity);
        Ok(())
    }

    /// Overwrite committed path values (used when restoring a snapshot).
    pub fn restore_path(
        &mut self,
        path: PathId,
        value: Option<Real>,
        state: Option<SwitchState>,
        flow: Option<Real>,
    ) -> CircuitResult<()> {
        let name = self.name.clone();
        let p = self.paths.get_mut(path.slot()).ok_or(CircuitError::NotFound {
            circuit: name,
            what: "path",
            name: path.to_string(),
        })?;
        p.restore(value, state, flow);
        Ok(())
    }

    fn path_checked(&self, path: PathId) -> CircuitResult<&Path> {
        self.paths.get(path.slot()).ok_or_else(|| CircuitError::NotFound {
            circuit: self.name.clone(),
            what: "path",
            name: path.to_string(),
        })
    }

    fn expect_kind(&self, path: PathId, kind: ElementKind) -> CircuitResult<()> {
        let p = self.path_checked(path)?;
        if p.kind != kind {
            return Err(CircuitError::ElementMismatch {
                circuit: self.name.clone(),
                path: p.name.clone(),
                expected: kind.name(),
                actual: p.kind.name(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CircuitBuilder;

    fn two_node() -> (FluidCircuit, NodeId, PathId) {
        let mut b = CircuitBuilder::<Fluid>::new("c");
        let g = b.add_reference_node("G", Some(0.0));
        let a = b.add_node("A");
        b.add_potential_source("Src", g, a, 10.0);
        let r = b.add_resistor("R", a, g, 5.0);
        (b.build().unwrap(), a, r)
    }

    #[test]
    fn set_next_value_is_staged() {
        let (mut c, _, r) = two_node();
        c.set_next_value(r, 2.0).unwrap();
        assert_eq!(c.path(r).unwrap().value(), Some(5.0));
        c.commit();
        assert_eq!(c.path(r).unwrap().value(), Some(2.0));
    }

    #[test]
    fn value_check_stages_nothing() {
        let (mut c, _, r) = two_node();
        c.check_next_value(r, 3.0).unwrap();
        for bad in [0.0, -1.0, Real::NAN] {
            let err = c.check_next_value(r, bad).unwrap_err();
            assert_eq!(err.severity(), pf_core::Severity::Recoverable);
            assert!(c.set_next_value(r, bad).is_err());
        }
        c.commit();
        assert_eq!(c.path(r).unwrap().value(), Some(5.0));
    }

    #[test]
    fn switch_setter_rejects_other_kinds() {
        let (mut c, _, r) = two_node();
        let err = c.set_next_switch(r, SwitchState::Open).unwrap_err();
        assert!(matches!(err, CircuitError::ElementMismatch { .. }));
    }

    #[test]
    fn clear_restores_baseline_and_forgets_flow() {
        let (mut c, a, r) = two_node();
        c.solve(0.02, &SolveOptions::default()).unwrap();
        c.commit();
        assert!(c.path(r).unwrap().has_flow());
        c.clear();
        assert!(!c.path(r).unwrap().has_flow());
        assert!(!c.node(a).unwrap().has_potential());
        assert_eq!(c.path(r).unwrap().value(), Some(5.0));
    }

    #[test]
    fn lookups_by_name() {
        let (c, a, r) = two_node();
        assert_eq!(c.node_by_name("A"), Some(a));
        assert_eq!(c.path_by_name("R"), Some(r));
        assert_eq!(c.path_by_name("missing"), None);
    }
}
