//! Incremental circuit builder.

use core::marker::PhantomData;
use std::collections::HashMap;

use pf_core::{NodeId, PathId, Real};

use crate::circuit::Circuit;
use crate::domain::{Domain, SwitchResistances};
use crate::element::{ElementKind, Node, Path, SwitchState};
use crate::error::CircuitResult;
use crate::staged::Staged;
use crate::validate;

/// Builder for constructing a circuit incrementally.
///
/// Use the `add_*` methods to lay out nodes and paths, then call `build()`
/// to validate and freeze the topology into a `Circuit`. Values given here
/// become the baseline that `Circuit::clear` returns to.
#[derive(Debug)]
pub struct CircuitBuilder<D: Domain> {
    name: String,
    nodes: Vec<Node>,
    paths: Vec<Path>,
    resistances: SwitchResistances,
    _domain: PhantomData<D>,
}

impl<D: Domain> CircuitBuilder<D> {
    /// Create a new empty builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            paths: Vec::new(),
            resistances: SwitchResistances::of::<D>(),
            _domain: PhantomData,
        }
    }

    /// Override the open/closed resistances used for switches and valves.
    pub fn with_switch_resistances(mut self, resistances: SwitchResistances) -> Self {
        self.resistances = resistances;
        self
    }

    /// Add a solved node and return its ID.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(name.into(), false)
    }

    /// Add a node whose potential is imposed rather than solved.
    ///
    /// With `potential == None` the domain's zero potential is used until a
    /// value is staged.
    pub fn add_reference_node(
        &mut self,
        name: impl Into<String>,
        potential: Option<Real>,
    ) -> NodeId {
        let id = self.push_node(name.into(), true);
        if let Some(p) = potential {
            self.set_node_potential(id, p);
        }
        id
    }

    /// Set the baseline potential of a node.
    pub fn set_node_potential(&mut self, node: NodeId, potential: Real) {
        if let Some(n) = self.nodes.get_mut(node.slot()) {
            n.potential = Staged::with_baseline(potential);
        }
    }

    /// Set the baseline stored quantity of a node.
    pub fn set_node_quantity(&mut self, node: NodeId, quantity: Real) {
        if let Some(n) = self.nodes.get_mut(node.slot()) {
            n.quantity = Staged::with_baseline(quantity);
        }
    }

    pub fn add_resistor(
        &mut self,
        name: impl Into<String>,
        source: NodeId,
        target: NodeId,
        resistance: Real,
    ) -> PathId {
        self.push_valued(name.into(), source, target, ElementKind::Resistor, resistance)
    }

    pub fn add_capacitor(
        &mut self,
        name: impl Into<String>,
        source: NodeId,
        target: NodeId,
        capacitance: Real,
    ) -> PathId {
        self.push_valued(name.into(), source, target, ElementKind::Capacitor, capacitance)
    }

    pub fn add_flow_source(
        &mut self,
        name: impl Into<String>,
        source: NodeId,
        target: NodeId,
        flow: Real,
    ) -> PathId {
        self.push_valued(name.into(), source, target, ElementKind::FlowSource, flow)
    }

    /// Potential source: `potential(target) - potential(source) == rise`.
    pub fn add_potential_source(
        &mut self,
        name: impl Into<String>,
        source: NodeId,
        target: NodeId,
        rise: Real,
    ) -> PathId {
        self.push_valued(name.into(), source, target, ElementKind::PotentialSource, rise)
    }

    pub fn add_switch(
        &mut self,
        name: impl Into<String>,
        source: NodeId,
        target: NodeId,
        state: SwitchState,
    ) -> PathId {
        let id = self.push_path(name.into(), source, target, ElementKind::Switch);
        self.paths[id.slot()].state = Staged::with_baseline(state);
        id
    }

    /// Valve conducting source → target. Starts closed (conducting).
    pub fn add_valve(&mut self, name: impl Into<String>, source: NodeId, target: NodeId) -> PathId {
        let id = self.push_path(name.into(), source, target, ElementKind::Valve);
        self.paths[id.slot()].state = Staged::with_baseline(SwitchState::Closed);
        id
    }

    /// Rename a node (useful for post-construction adjustments).
    pub fn rename_node(&mut self, node_id: NodeId, new_name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(node_id.slot()) {
            node.name = new_name.into();
        }
    }

    /// Validate and freeze the circuit.
    pub fn build(self) -> CircuitResult<Circuit<D>> {
        validate::validate_structure(&self.name, &self.nodes, &self.paths)?;

        let (node_path_offsets, node_paths) = Self::build_adjacency(&self.nodes, &self.paths);
        validate::validate_connectivity(&self.name, &self.nodes, &node_path_offsets)?;

        let node_names: HashMap<String, NodeId> =
            self.nodes.iter().map(|n| (n.name.clone(), n.id)).collect();
        let path_names: HashMap<String, PathId> =
            self.paths.iter().map(|p| (p.name.clone(), p.id)).collect();

        Ok(Circuit {
            name: self.name,
            nodes: self.nodes,
            paths: self.paths,
            node_path_offsets,
            node_paths,
            node_names,
            path_names,
            resistances: self.resistances,
            _domain: PhantomData,
        })
    }

    fn push_node(&mut self, name: String, reference: bool) -> NodeId {
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, name, reference));
        id
    }

    fn push_path(
        &mut self,
        name: String,
        source: NodeId,
        target: NodeId,
        kind: ElementKind,
    ) -> PathId {
        let id = PathId::from_index(self.paths.len() as u32);
        self.paths.push(Path::new(id, name, source, target, kind));
        id
    }

    fn push_valued(
        &mut self,
        name: String,
        source: NodeId,
        target: NodeId,
        kind: ElementKind,
        value: Real,
    ) -> PathId {
        let id = self.push_path(name, source, target, kind);
        self.paths[id.slot()].value = Staged::with_baseline(value);
        id
    }

    /// Build compact adjacency lists: for each node, collect its incident paths.
    fn build_adjacency(nodes: &[Node], paths: &[Path]) -> (Vec<usize>, Vec<PathId>) {
        let mut node_to_paths: HashMap<NodeId, Vec<PathId>> = HashMap::new();
        for path in paths {
            node_to_paths.entry(path.source).or_default().push(path.id);
            node_to_paths.entry(path.target).or_default().push(path.id);
        }

        // Sort each node's path list for determinism
        for list in node_to_paths.values_mut() {
            list.sort_by_key(|p| p.index());
        }

        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        let mut flat = Vec::new();
        offsets.push(0);
        for node in nodes {
            if let Some(list) = node_to_paths.get(&node.id) {
                flat.extend_from_slice(list);
            }
            offsets.push(flat.len());
        }

        (offsets, flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Fluid;
    use crate::error::CircuitError;

    #[test]
    fn builder_basic() {
        let mut builder = CircuitBuilder::<Fluid>::new("c");
        let n1 = builder.add_reference_node("Ground", Some(0.0));
        let n2 = builder.add_node("Node2");
        let p1 = builder.add_resistor("R1", n1, n2, 2.0);

        assert_eq!(n1.index(), 0);
        assert_eq!(n2.index(), 1);
        assert_eq!(p1.index(), 0);
        assert_eq!(builder.nodes.len(), 2);
        assert_eq!(builder.paths.len(), 1);
    }

    #[test]
    fn builder_rename() {
        let mut builder = CircuitBuilder::<Fluid>::new("c");
        let n1 = builder.add_node("Old");
        builder.rename_node(n1, "New");
        assert_eq!(builder.nodes[0].name, "New");
    }

    #[test]
    fn builder_build_adjacency() {
        let mut builder = CircuitBuilder::<Fluid>::new("c");
        let g = builder.add_reference_node("G", None);
        let a = builder.add_node("A");
        let b = builder.add_node("B");
        builder.add_resistor("R1", g, a, 1.0);
        builder.add_resistor("R2", a, b, 1.0);
        builder.add_capacitor("C1", b, g, 0.5);

        let circuit = builder.build().unwrap();
        assert_eq!(circuit.nodes().len(), 3);
        assert_eq!(circuit.paths().len(), 3);
        assert_eq!(circuit.node_paths(a).len(), 2);
        assert_eq!(circuit.node_paths(g).len(), 2);
    }

    #[test]
    fn builder_rejects_duplicate_path_names() {
        let mut builder = CircuitBuilder::<Fluid>::new("c");
        let g = builder.add_reference_node("G", None);
        let a = builder.add_node("A");
        builder.add_resistor("R", g, a, 1.0);
        builder.add_resistor("R", a, g, 1.0);
        assert!(matches!(
            builder.build(),
            Err(CircuitError::DuplicateName { .. })
        ));
    }

    #[test]
    fn builder_requires_reference_node() {
        let mut builder = CircuitBuilder::<Fluid>::new("c");
        let a = builder.add_node("A");
        let b = builder.add_node("B");
        builder.add_resistor("R", a, b, 1.0);
        assert!(matches!(
            builder.build(),
            Err(CircuitError::NoReferenceNode { .. })
        ));
    }
}
