//! Circuit elements.

use pf_core::{NodeId, PathId, Real};

use crate::staged::Staged;

/// Open/closed state shared by switches and valves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwitchState {
    Open,
    Closed,
}

impl SwitchState {
    pub fn is_closed(self) -> bool {
        matches!(self, SwitchState::Closed)
    }
}

/// What a path does between its two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Flow proportional to the potential drop.
    Resistor,
    /// Stores quantity on the source node; flow follows the rate of change
    /// of the potential drop.
    Capacitor,
    /// Fixed flow from source to target.
    FlowSource,
    /// Fixed potential rise from source to target.
    PotentialSource,
    /// Closed or open resistance, set externally.
    Switch,
    /// Closed resistance when forward-biased, open otherwise; state is found
    /// by the solver.
    Valve,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Resistor => "resistor",
            ElementKind::Capacitor => "capacitor",
            ElementKind::FlowSource => "flow source",
            ElementKind::PotentialSource => "potential source",
            ElementKind::Switch => "switch",
            ElementKind::Valve => "valve",
        }
    }

    /// Whether the element value is a resistance or capacitance and must be
    /// strictly positive.
    pub(crate) fn needs_positive_value(self) -> bool {
        matches!(self, ElementKind::Resistor | ElementKind::Capacitor)
    }
}

/// A node holds one potential (pressure, temperature, voltage) and,
/// optionally, a stored quantity (volume, heat, charge).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub(crate) reference: bool,
    pub(crate) potential: Staged<Real>,
    pub(crate) quantity: Staged<Real>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, reference: bool) -> Self {
        Self {
            id,
            name,
            reference,
            potential: Staged::unset(),
            quantity: Staged::unset(),
        }
    }

    /// Reference nodes have their potential imposed, not solved.
    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn potential(&self) -> Option<Real> {
        self.potential.get()
    }

    pub fn has_potential(&self) -> bool {
        self.potential.has()
    }

    pub fn next_potential(&self) -> Option<Real> {
        self.potential.next()
    }

    /// Stage a potential. Meaningful as an input only on reference nodes;
    /// on other nodes the next solve overwrites it.
    pub fn set_next_potential(&mut self, value: Real) {
        self.potential.set_next(value);
    }

    pub fn quantity(&self) -> Option<Real> {
        self.quantity.get()
    }

    pub fn has_quantity(&self) -> bool {
        self.quantity.has()
    }

    pub fn next_quantity(&self) -> Option<Real> {
        self.quantity.next()
    }

    pub fn set_next_quantity(&mut self, value: Real) {
        self.quantity.set_next(value);
    }

    pub(crate) fn commit(&mut self) {
        self.potential.commit();
        self.quantity.commit();
    }

    pub(crate) fn clear(&mut self) {
        self.potential.clear();
        self.quantity.clear();
    }

    pub(crate) fn restore(&mut self, potential: Option<Real>, quantity: Option<Real>) {
        self.potential.force(potential);
        self.quantity.force(quantity);
    }
}

/// A path joins a source node to a target node through one element.
///
/// Positive flow runs source → target.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub id: PathId,
    pub name: String,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: ElementKind,
    pub(crate) value: Staged<Real>,
    pub(crate) state: Staged<SwitchState>,
    pub(crate) flow: Staged<Real>,
}

impl Path {
    pub(crate) fn new(
        id: PathId,
        name: String,
        source: NodeId,
        target: NodeId,
        kind: ElementKind,
    ) -> Self {
        Self {
            id,
            name,
            source,
            target,
            kind,
            value: Staged::unset(),
            state: Staged::unset(),
            flow: Staged::unset(),
        }
    }

    pub fn flow(&self) -> Option<Real> {
        self.flow.get()
    }

    pub fn has_flow(&self) -> bool {
        self.flow.has()
    }

    pub fn next_flow(&self) -> Option<Real> {
        self.flow.next()
    }

    /// Committed element value: resistance, capacitance or source term,
    /// depending on `kind`. `None` for switches and valves.
    pub fn value(&self) -> Option<Real> {
        self.value.get()
    }

    pub fn next_value(&self) -> Option<Real> {
        self.value.next_or_current()
    }

    /// Committed switch or valve state.
    pub fn state(&self) -> Option<SwitchState> {
        self.state.get()
    }

    pub fn next_state(&self) -> Option<SwitchState> {
        self.state.next_or_current()
    }

    pub(crate) fn commit(&mut self) {
        self.value.commit();
        self.state.commit();
        self.flow.commit();
    }

    pub(crate) fn clear(&mut self) {
        self.value.clear();
        self.state.clear();
        self.flow.clear();
    }

    pub(crate) fn restore(
        &mut self,
        value: Option<Real>,
        state: Option<SwitchState>,
        flow: Option<Real>,
    ) {
        self.value.force(value);
        self.state.force(state);
        self.flow.force(flow);
    }
}
