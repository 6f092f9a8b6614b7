//! Arena of compartments and links for one physical domain.

use std::collections::HashMap;
use std::marker::PhantomData;

use pf_circuit::{Circuit, Domain, Fluid};
use pf_core::{Id, NodeId, PathId, Real, SubstanceId};
use tracing::debug;

use crate::compartment::{Compartment, Link};
use crate::error::{CompartmentError, CompartmentResult};
use crate::ids::{CompartmentId, GraphKey, LinkId};
use crate::quantity::SubstanceQuantity;
use crate::substance::{Phase, Substance};

/// Compartments, their hierarchy and the links between them.
///
/// Every identifier handed out carries this graph's key, so ids from
/// another graph are rejected instead of silently aliasing.
#[derive(Debug, Clone)]
pub struct CompartmentGraph<D: Domain> {
    pub(crate) name: String,
    pub(crate) key: GraphKey,
    pub(crate) phase: Option<Phase>,
    pub(crate) compartments: Vec<Compartment>,
    pub(crate) links: Vec<Option<Link>>,
    compartment_names: HashMap<String, CompartmentId>,
    link_names: HashMap<String, LinkId>,
    node_owner: HashMap<NodeId, CompartmentId>,
    pub(crate) active: Vec<SubstanceId>,
    substance_names: HashMap<String, SubstanceId>,
    generation: u64,
    _domain: PhantomData<D>,
}

impl CompartmentGraph<Fluid> {
    /// A fluid graph carrying gas substances (volume and volume fraction).
    pub fn gas(name: impl Into<String>) -> Self {
        Self::with_phase(name.into(), Some(Phase::Gas))
    }

    /// A fluid graph carrying dissolved substances (mass and concentration).
    pub fn liquid(name: impl Into<String>) -> Self {
        Self::with_phase(name.into(), Some(Phase::Liquid))
    }
}

impl<D: Domain> CompartmentGraph<D> {
    /// A graph with no substance tracking (thermal, electrical).
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_phase(name.into(), None)
    }

    fn with_phase(name: String, phase: Option<Phase>) -> Self {
        Self {
            name,
            key: GraphKey::fresh(),
            phase,
            compartments: Vec::new(),
            links: Vec::new(),
            compartment_names: HashMap::new(),
            link_names: HashMap::new(),
            node_owner: HashMap::new(),
            active: Vec::new(),
            substance_names: HashMap::new(),
            generation: 0,
            _domain: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> GraphKey {
        self.key
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    // ---- compartments ---------------------------------------------------

    pub fn add_compartment(&mut self, name: impl Into<String>) -> CompartmentResult<CompartmentId> {
        let name = name.into();
        if self.compartment_names.contains_key(&name) {
            return Err(CompartmentError::DuplicateName {
                graph: self.name.clone(),
                what: "compartment",
                name,
            });
        }
        let id = CompartmentId {
            graph: self.key,
            id: Id::from_index(self.compartments.len() as u32),
        };
        let mut cmpt = Compartment::new(id, name.clone());
        cmpt.substances = self.active.iter().map(|&s| SubstanceQuantity::new(s)).collect();
        self.compartments.push(cmpt);
        self.compartment_names.insert(name, id);
        Ok(id)
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn compartment(&self, id: CompartmentId) -> Option<&Compartment> {
        if id.graph != self.key {
            return None;
        }
        self.compartments.get(id.slot())
    }

    pub fn compartment_by_name(&self, name: &str) -> Option<CompartmentId> {
        self.compartment_names.get(name).copied()
    }

    pub(crate) fn checked(&self, id: CompartmentId) -> CompartmentResult<&Compartment> {
        self.compartment(id).ok_or_else(|| CompartmentError::ForeignId {
            graph: self.name.clone(),
            what: "compartment",
        })
    }

    pub(crate) fn checked_mut(&mut self, id: CompartmentId) -> CompartmentResult<&mut Compartment> {
        if id.graph != self.key || id.slot() >= self.compartments.len() {
            return Err(CompartmentError::ForeignId {
                graph: self.name.clone(),
                what: "compartment",
            });
        }
        Ok(&mut self.compartments[id.slot()])
    }

    fn name_of(&self, id: CompartmentId) -> String {
        self.compartment(id).map(|c| c.name.clone()).unwrap_or_default()
    }

    // ---- hierarchy ------------------------------------------------------

    /// Make `child` a child of `parent`.
    ///
    /// Refuses re-parenting, cycles, and parents that map nodes directly.
    pub fn add_child(
        &mut self,
        parent: CompartmentId,
        child: CompartmentId,
    ) -> CompartmentResult<()> {
        let p = self.checked(parent)?;
        let c = self.checked(child)?;
        if !p.nodes.is_empty() {
            return Err(CompartmentError::MixedHierarchy {
                graph: self.name.clone(),
                compartment: p.name.clone(),
            });
        }
        if let Some(existing) = c.parent {
            return Err(CompartmentError::AlreadyParented {
                graph: self.name.clone(),
                child: c.name.clone(),
                parent: self.name_of(existing),
            });
        }
        let mut cursor = Some(parent);
        while let Some(at) = cursor {
            if at == child {
                return Err(CompartmentError::Cycle {
                    graph: self.name.clone(),
                    parent: p.name.clone(),
                    child: c.name.clone(),
                });
            }
            cursor = self.compartments[at.slot()].parent;
        }

        self.compartments[child.slot()].parent = Some(parent);
        self.compartments[parent.slot()].children.push(child);
        self.generation += 1;
        let mut cursor = Some(parent);
        while let Some(at) = cursor {
            let cmpt = &mut self.compartments[at.slot()];
            cmpt.topology_generation = self.generation;
            cursor = cmpt.parent;
        }
        Ok(())
    }

    /// Childless descendants of `id` (a childless compartment is its own leaf).
    ///
    /// Cached per compartment and rebuilt when its subtree changed.
    pub fn leaves(&self, id: CompartmentId) -> CompartmentResult<Vec<CompartmentId>> {
        let cmpt = self.checked(id)?;
        {
            let cache = cmpt.leaf_cache.borrow();
            if cache.generation == Some(cmpt.topology_generation) {
                return Ok(cache.leaves.clone());
            }
        }
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(at) = stack.pop() {
            let c = &self.compartments[at.slot()];
            if c.children.is_empty() {
                leaves.push(at);
            } else {
                stack.extend(c.children.iter().rev());
            }
        }
        let mut cache = cmpt.leaf_cache.borrow_mut();
        cache.generation = Some(cmpt.topology_generation);
        cache.leaves = leaves.clone();
        Ok(leaves)
    }

    // ---- node mapping ---------------------------------------------------

    /// Map a circuit node onto a leaf compartment.
    pub fn map_node(&mut self, id: CompartmentId, node: NodeId) -> CompartmentResult<()> {
        let cmpt = self.checked(id)?;
        if !cmpt.is_leaf() {
            return Err(CompartmentError::MixedHierarchy {
                graph: self.name.clone(),
                compartment: cmpt.name.clone(),
            });
        }
        if let Some(&owner) = self.node_owner.get(&node) {
            return Err(CompartmentError::DuplicateNodeMapping {
                graph: self.name.clone(),
                compartment: self.name_of(owner),
                node: node.to_string(),
            });
        }
        self.node_owner.insert(node, id);
        self.compartments[id.slot()].nodes.push(node);
        Ok(())
    }

    /// Compartment a node is mapped to.
    pub fn node_owner(&self, node: NodeId) -> Option<CompartmentId> {
        self.node_owner.get(&node).copied()
    }

    // ---- links ----------------------------------------------------------

    pub fn add_link(
        &mut self,
        name: impl Into<String>,
        source: CompartmentId,
        target: CompartmentId,
    ) -> CompartmentResult<LinkId> {
        let name = name.into();
        self.checked(source)?;
        self.checked(target)?;
        if self.link_names.contains_key(&name) {
            return Err(CompartmentError::DuplicateName {
                graph: self.name.clone(),
                what: "link",
                name,
            });
        }
        let id = LinkId {
            graph: self.key,
            id: Id::from_index(self.links.len() as u32),
        };
        self.links.push(Some(Link {
            id,
            name: name.clone(),
            source,
            target,
            path: None,
            flow: None,
        }));
        self.link_names.insert(name, id);

        let src = &mut self.compartments[source.slot()];
        src.links.push(id);
        src.outgoing.push(id);
        let tgt = &mut self.compartments[target.slot()];
        tgt.links.push(id);
        tgt.incoming.push(id);
        Ok(id)
    }

    /// Derive a link's flow from a circuit path.
    pub fn bind_path(&mut self, link: LinkId, path: PathId) -> CompartmentResult<()> {
        self.link_checked_mut(link)?.path = Some(path);
        Ok(())
    }

    pub fn remove_link(&mut self, link: LinkId) -> CompartmentResult<Link> {
        let removed = self.link_checked_mut(link)?.clone();
        self.links[link.slot()] = None;
        self.link_names.remove(&removed.name);
        for end in [removed.source, removed.target] {
            let cmpt = &mut self.compartments[end.slot()];
            cmpt.links.retain(|&l| l != link);
            cmpt.incoming.retain(|&l| l != link);
            cmpt.outgoing.retain(|&l| l != link);
        }
        Ok(removed)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        if id.graph != self.key {
            return None;
        }
        self.links.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn link_by_name(&self, name: &str) -> Option<LinkId> {
        self.link_names.get(name).copied()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.iter().flatten()
    }

    fn link_checked_mut(&mut self, id: LinkId) -> CompartmentResult<&mut Link> {
        if id.graph != self.key {
            return Err(CompartmentError::ForeignId {
                graph: self.name.clone(),
                what: "link",
            });
        }
        match self.links.get_mut(id.slot()) {
            Some(Some(link)) => Ok(link),
            _ => Err(CompartmentError::NotFound {
                graph: self.name.clone(),
                what: "link",
                name: format!("{id:?}"),
            }),
        }
    }

    // ---- stored values --------------------------------------------------

    /// Set a leaf's potential directly (compartments without nodes).
    pub fn set_potential(&mut self, id: CompartmentId, value: Real) -> CompartmentResult<()> {
        self.check_value(id, "potential", value, false)?;
        self.checked_mut(id)?.potential = Some(value);
        Ok(())
    }

    /// Set a leaf's stored quantity. `Real::INFINITY` marks a reservoir.
    pub fn set_quantity(&mut self, id: CompartmentId, value: Real) -> CompartmentResult<()> {
        self.check_value(id, "quantity", value, true)?;
        self.checked_mut(id)?.quantity = Some(value);
        Ok(())
    }

    fn check_value(
        &self,
        id: CompartmentId,
        what: &'static str,
        value: Real,
        allow_infinite: bool,
    ) -> CompartmentResult<()> {
        let cmpt = self.checked(id)?;
        if !cmpt.is_leaf() {
            return Err(CompartmentError::NotLeaf {
                graph: self.name.clone(),
                compartment: cmpt.name.clone(),
            });
        }
        let ok = value.is_finite() || (allow_infinite && value == Real::INFINITY);
        if !ok || (allow_infinite && value < 0.0) {
            return Err(CompartmentError::InvalidValue {
                graph: self.name.clone(),
                compartment: cmpt.name.clone(),
                what,
                value,
            });
        }
        Ok(())
    }

    /// Pull committed node values and path flows from the circuit this
    /// graph is laid over.
    ///
    /// A leaf's quantity is the sum of its nodes' quantities; its potential
    /// is their quantity-weighted mean (plain mean when quantities are
    /// missing). Leaves whose nodes have no committed value keep what they
    /// had.
    pub fn sync_from_circuit(&mut self, circuit: &Circuit<D>) -> CompartmentResult<()> {
        for cmpt in self.compartments.iter_mut().filter(|c| !c.nodes.is_empty()) {
            let mut samples = Vec::with_capacity(cmpt.nodes.len());
            for &node_id in &cmpt.nodes {
                let node = circuit.node(node_id).ok_or_else(|| CompartmentError::NotFound {
                    graph: self.name.clone(),
                    what: "node",
                    name: node_id.to_string(),
                })?;
                samples.push((node.potential(), node.quantity()));
            }
            let quantities: Vec<Real> = samples.iter().filter_map(|s| s.1).collect();
            if !quantities.is_empty() {
                cmpt.quantity = Some(quantities.iter().sum());
            }
            let potentials: Vec<(Real, Option<Real>)> =
                samples.iter().filter_map(|s| s.0.map(|p| (p, s.1))).collect();
            if !potentials.is_empty() {
                cmpt.potential = Some(weighted_mean(&potentials));
            }
        }
        for link in self.links.iter_mut().flatten() {
            let Some(path_id) = link.path else {
                continue;
            };
            let path = circuit.path(path_id).ok_or_else(|| CompartmentError::NotFound {
                graph: self.name.clone(),
                what: "path",
                name: path_id.to_string(),
            })?;
            if path.flow().is_some() {
                link.flow = path.flow();
            }
        }
        debug!(graph = %self.name, circuit = circuit.name(), "compartments synced");
        Ok(())
    }

    /// Set a link's flow directly (links not bound to a path).
    pub fn set_link_flow(&mut self, link: LinkId, flow: Real) -> CompartmentResult<()> {
        if !flow.is_finite() {
            return Err(CompartmentError::NonFinite {
                graph: self.name.clone(),
                compartment: format!("{link:?}"),
                what: "link flow".to_string(),
            });
        }
        self.link_checked_mut(link)?.flow = Some(flow);
        Ok(())
    }

    /// Overwrite a leaf's stored values (used when restoring a snapshot).
    pub fn restore_values(
        &mut self,
        id: CompartmentId,
        potential: Option<Real>,
        quantity: Option<Real>,
    ) -> CompartmentResult<()> {
        let graph = self.name.clone();
        let cmpt = self.checked_mut(id)?;
        if !cmpt.is_leaf() {
            return Err(CompartmentError::NotLeaf {
                graph,
                compartment: cmpt.name.clone(),
            });
        }
        cmpt.potential = potential;
        cmpt.quantity = quantity;
        Ok(())
    }

    /// Overwrite a link's committed flow (used when restoring a snapshot).
    pub fn restore_link_flow(&mut self, link: LinkId, flow: Option<Real>) -> CompartmentResult<()> {
        self.link_checked_mut(link)?.flow = flow;
        Ok(())
    }

    // ---- substances -----------------------------------------------------

    /// Create a quantity record for `substance` in every compartment.
    /// Returns `false` if it was already active here.
    pub fn activate_substance(&mut self, substance: &Substance) -> CompartmentResult<bool> {
        if self.phase != Some(substance.phase) {
            return Err(CompartmentError::PhaseMismatch {
                graph: self.name.clone(),
                substance: substance.name.clone(),
                expected: self.phase.map_or("no substances", Phase::name),
                actual: substance.phase.name(),
            });
        }
        if self.active.contains(&substance.id) {
            return Ok(false);
        }
        self.active.push(substance.id);
        self.substance_names.insert(substance.name.clone(), substance.id);
        for cmpt in &mut self.compartments {
            cmpt.substances.push(SubstanceQuantity::new(substance.id));
        }
        Ok(true)
    }

    pub fn active_substances(&self) -> &[SubstanceId] {
        &self.active
    }

    pub fn substance_id(&self, name: &str) -> Option<SubstanceId> {
        self.substance_names.get(name).copied()
    }

    /// Mutable record of an active substance on a leaf.
    pub fn substance_mut(
        &mut self,
        id: CompartmentId,
        substance: SubstanceId,
    ) -> CompartmentResult<&mut SubstanceQuantity> {
        let graph = self.name.clone();
        let cmpt = self.checked_mut(id)?;
        if !cmpt.is_leaf() {
            return Err(CompartmentError::NotLeaf {
                graph,
                compartment: cmpt.name.clone(),
            });
        }
        let name = cmpt.name.clone();
        cmpt.substance_mut(substance)
            .ok_or(CompartmentError::InactiveSubstance {
                graph,
                substance: format!("{substance} in '{name}'"),
            })
    }

    // ---- aggregated reads -----------------------------------------------

    /// Stored quantity, summed over leaves.
    pub fn quantity(&self, id: CompartmentId) -> Option<Real> {
        let leaves = self.leaves(id).ok()?;
        self.sum_over(&leaves, |c| c.quantity)
    }

    /// Potential, weighted by each leaf's current quantity.
    pub fn potential(&self, id: CompartmentId) -> Option<Real> {
        let leaves = self.leaves(id).ok()?;
        self.weighted_over(&leaves, |c| c.potential)
    }

    /// Substance record aggregated over leaves: extensive fields summed,
    /// intensive fields weighted by each leaf's current quantity.
    pub fn substance(
        &self,
        id: CompartmentId,
        substance: SubstanceId,
    ) -> Option<SubstanceQuantity> {
        let leaves = self.leaves(id).ok()?;
        if let [single] = leaves.as_slice() {
            return self.compartments[single.slot()].substance(substance).cloned();
        }
        if !self.active.contains(&substance) {
            return None;
        }
        let field = |f: fn(&SubstanceQuantity) -> Option<Real>| {
            move |c: &Compartment| c.substance(substance).and_then(f)
        };
        let mut agg = SubstanceQuantity::new(substance);
        agg.volume = self.sum_over(&leaves, field(SubstanceQuantity::volume));
        agg.mass = self.sum_over(&leaves, field(SubstanceQuantity::mass));
        agg.concentration = self.weighted_over(&leaves, field(SubstanceQuantity::concentration));
        agg.volume_fraction =
            self.weighted_over(&leaves, field(SubstanceQuantity::volume_fraction));
        agg.partial_pressure =
            self.weighted_over(&leaves, field(SubstanceQuantity::partial_pressure));
        Some(agg)
    }

    /// Net committed flow into the compartment from outside its subtree,
    /// split into `(in, out)` magnitudes.
    pub fn flows(&self, id: CompartmentId) -> Option<(Real, Real)> {
        let leaves = self.leaves(id).ok()?;
        let mut inflow = 0.0;
        let mut outflow = 0.0;
        let mut seen = false;
        for &leaf in &leaves {
            for link in self.compartments[leaf.slot()]
                .links
                .iter()
                .filter_map(|&l| self.link(l))
            {
                let other = if link.target == leaf { link.source } else { link.target };
                if leaves.contains(&other) {
                    continue;
                }
                let Some(q) = link.flow else { continue };
                seen = true;
                let into = if link.target == leaf { q } else { -q };
                if into > 0.0 {
                    inflow += into;
                } else {
                    outflow -= into;
                }
            }
        }
        seen.then_some((inflow, outflow))
    }

    pub fn in_flow(&self, id: CompartmentId) -> Option<Real> {
        self.flows(id).map(|f| f.0)
    }

    pub fn out_flow(&self, id: CompartmentId) -> Option<Real> {
        self.flows(id).map(|f| f.1)
    }

    /// Look up a named scalar on a compartment.
    ///
    /// Top-level keys: the domain's potential and quantity names (or the
    /// generic `Potential`/`Quantity`), `InFlow`, `OutFlow`. Substance fields
    /// use `<Substance>.<Field>` or `<Substance>-<Field>`.
    pub fn get_scalar(&self, id: CompartmentId, key: &str) -> Option<Real> {
        self.compartment(id)?;
        let kind = D::KIND;
        let split = key.split_once('.').or_else(|| key.split_once('-'));
        match split {
            None => match key {
                "Potential" => self.potential(id),
                "Quantity" => self.quantity(id),
                "InFlow" => self.in_flow(id),
                "OutFlow" => self.out_flow(id),
                k if k == kind.potential_name() => self.potential(id),
                k if k == kind.quantity_name() => self.quantity(id),
                _ => None,
            },
            Some((substance, field)) => {
                let sid = self.substance_id(substance)?;
                self.substance(id, sid)?.field(field)
            }
        }
    }

    fn sum_over(
        &self,
        leaves: &[CompartmentId],
        f: impl Fn(&Compartment) -> Option<Real>,
    ) -> Option<Real> {
        let values: Vec<Real> = leaves
            .iter()
            .filter_map(|l| f(&self.compartments[l.slot()]))
            .collect();
        (!values.is_empty()).then(|| values.iter().sum())
    }

    fn weighted_over(
        &self,
        leaves: &[CompartmentId],
        f: impl Fn(&Compartment) -> Option<Real>,
    ) -> Option<Real> {
        let samples: Vec<(Real, Option<Real>)> = leaves
            .iter()
            .map(|l| &self.compartments[l.slot()])
            .filter_map(|c| f(c).map(|v| (v, c.quantity)))
            .collect();
        (!samples.is_empty()).then(|| weighted_mean(&samples))
    }
}

/// Mean of `(value, weight)` samples.
///
/// Infinite weights dominate; missing or all-zero weights fall back to a
/// plain mean.
fn weighted_mean(samples: &[(Real, Option<Real>)]) -> Real {
    let infinite: Vec<Real> = samples
        .iter()
        .filter(|s| s.1 == Some(Real::INFINITY))
        .map(|s| s.0)
        .collect();
    if !infinite.is_empty() {
        return infinite.iter().sum::<Real>() / infinite.len() as Real;
    }
    let total: Real = samples.iter().filter_map(|s| s.1).sum();
    if samples.iter().all(|s| s.1.is_some()) && total > 0.0 {
        samples.iter().map(|s| s.0 * s.1.unwrap_or(0.0)).sum::<Real>() / total
    } else {
        samples.iter().map(|s| s.0).sum::<Real>() / samples.len() as Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_circuit::Thermal;

    #[test]
    fn rejects_foreign_ids() {
        let mut a = CompartmentGraph::<Thermal>::new("A");
        let mut b = CompartmentGraph::<Thermal>::new("B");
        let a1 = a.add_compartment("Core").unwrap();
        let b1 = b.add_compartment("Core").unwrap();
        assert!(a.compartment(b1).is_none());
        assert!(matches!(
            a.add_link("X", a1, b1),
            Err(CompartmentError::ForeignId { .. })
        ));
    }

    #[test]
    fn weighted_mean_prefers_infinite_weights() {
        let m = weighted_mean(&[(1.0, Some(10.0)), (5.0, Some(Real::INFINITY))]);
        assert_eq!(m, 5.0);
        let m = weighted_mean(&[(1.0, Some(1.0)), (4.0, Some(3.0))]);
        assert!((m - 3.25).abs() < 1e-12);
        let m = weighted_mean(&[(1.0, None), (3.0, Some(2.0))]);
        assert_eq!(m, 2.0);
    }

    #[test]
    fn rejects_cycles_and_reparenting() {
        let mut g = CompartmentGraph::<Thermal>::new("G");
        let a = g.add_compartment("A").unwrap();
        let b = g.add_compartment("B").unwrap();
        let c = g.add_compartment("C").unwrap();
        g.add_child(a, b).unwrap();
        g.add_child(b, c).unwrap();
        assert!(matches!(g.add_child(c, a), Err(CompartmentError::Cycle { .. })));
        assert!(matches!(
            g.add_child(a, c),
            Err(CompartmentError::AlreadyParented { .. })
        ));
        assert!(matches!(g.add_child(a, a), Err(CompartmentError::Cycle { .. })));
    }

    #[test]
    fn node_mapped_once() {
        let mut g = CompartmentGraph::<Thermal>::new("G");
        let a = g.add_compartment("A").unwrap();
        let b = g.add_compartment("B").unwrap();
        let n = NodeId::from_index(3);
        g.map_node(a, n).unwrap();
        assert!(matches!(
            g.map_node(a, n),
            Err(CompartmentError::DuplicateNodeMapping { .. })
        ));
        assert!(g.map_node(b, n).is_err());
        assert_eq!(g.node_owner(n), Some(a));
    }

    #[test]
    fn scalar_lookup_uses_domain_names() {
        let mut g = CompartmentGraph::<Thermal>::new("G");
        let a = g.add_compartment("Skin").unwrap();
        g.set_potential(a, 310.0).unwrap();
        assert_eq!(g.get_scalar(a, "Temperature"), Some(310.0));
        assert_eq!(g.get_scalar(a, "Potential"), Some(310.0));
        assert_eq!(g.get_scalar(a, "Pressure"), None);
        assert_eq!(g.get_scalar(a, "Oxygen.VolumeFraction"), None);
    }
}
