//! Compartment and link records stored in a graph arena.

use std::cell::RefCell;

use pf_core::{NodeId, PathId, Real, SubstanceId};

use crate::ids::{CompartmentId, LinkId};
use crate::quantity::SubstanceQuantity;

/// Leaves computed for a given topology generation.
#[derive(Clone, Debug, Default)]
pub(crate) struct LeafCache {
    pub(crate) generation: Option<u64>,
    pub(crate) leaves: Vec<CompartmentId>,
}

/// A named grouping of circuit nodes.
///
/// Parent, children and links are identifiers into the owning graph.
/// Stored values (`potential`, `quantity`, substances) are meaningful on
/// leaves; the graph aggregates them for parents.
#[derive(Clone, Debug)]
pub struct Compartment {
    pub id: CompartmentId,
    pub name: String,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) parent: Option<CompartmentId>,
    pub(crate) children: Vec<CompartmentId>,
    pub(crate) links: Vec<LinkId>,
    pub(crate) incoming: Vec<LinkId>,
    pub(crate) outgoing: Vec<LinkId>,
    pub(crate) potential: Option<Real>,
    pub(crate) quantity: Option<Real>,
    pub(crate) substances: Vec<SubstanceQuantity>,
    pub(crate) topology_generation: u64,
    pub(crate) leaf_cache: RefCell<LeafCache>,
}

impl Compartment {
    pub(crate) fn new(id: CompartmentId, name: String) -> Self {
        Self {
            id,
            name,
            nodes: Vec::new(),
            parent: None,
            children: Vec::new(),
            links: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            potential: None,
            quantity: None,
            substances: Vec::new(),
            topology_generation: 0,
            leaf_cache: RefCell::new(LeafCache::default()),
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn parent(&self) -> Option<CompartmentId> {
        self.parent
    }

    pub fn children(&self) -> &[CompartmentId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Every link touching this compartment.
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Links whose target is this compartment.
    pub fn incoming(&self) -> &[LinkId] {
        &self.incoming
    }

    /// Links whose source is this compartment.
    pub fn outgoing(&self) -> &[LinkId] {
        &self.outgoing
    }

    /// Stored potential (pressure, temperature or voltage).
    pub fn potential(&self) -> Option<Real> {
        self.potential
    }

    /// Stored quantity (volume, heat or charge).
    pub fn quantity(&self) -> Option<Real> {
        self.quantity
    }

    pub fn has_infinite_quantity(&self) -> bool {
        self.quantity.is_some_and(|q| q == Real::INFINITY)
    }

    pub fn substance(&self, id: SubstanceId) -> Option<&SubstanceQuantity> {
        self.substances.iter().find(|q| q.substance == id)
    }

    pub(crate) fn substance_mut(&mut self, id: SubstanceId) -> Option<&mut SubstanceQuantity> {
        self.substances.iter_mut().find(|q| q.substance == id)
    }

    pub fn substances(&self) -> &[SubstanceQuantity] {
        &self.substances
    }
}

/// A directed connection between two compartments.
///
/// When bound to a circuit path, the link's flow is that path's committed
/// flow, positive from `source` to `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub name: String,
    pub source: CompartmentId,
    pub target: CompartmentId,
    pub(crate) path: Option<PathId>,
    pub(crate) flow: Option<Real>,
}

impl Link {
    pub fn path(&self) -> Option<PathId> {
        self.path
    }

    pub fn flow(&self) -> Option<Real> {
        self.flow
    }
}
