//! Stable indexing for the nodal solve.
//!
//! Maps circuit IDs to contiguous rows of the nodal system: one row per
//! solved (non-reference) node, then one row per potential source for the
//! flow through it.

use pf_core::{NodeId, PathId};

use crate::circuit::Circuit;
use crate::domain::Domain;
use crate::element::ElementKind;

/// Row assignment for one circuit.
#[derive(Debug, Clone)]
pub struct UnknownMap {
    /// NodeId slot -> row, `None` for reference nodes.
    node_rows: Vec<Option<usize>>,
    /// PathId slot -> row, `Some` only for potential sources.
    source_rows: Vec<Option<usize>>,
    /// Row -> node for the first `node_count` rows.
    row_nodes: Vec<NodeId>,
    /// Row - node_count -> path.
    row_sources: Vec<PathId>,
}

impl UnknownMap {
    /// Build the map from a circuit.
    pub fn from_circuit<D: Domain>(circuit: &Circuit<D>) -> Self {
        let mut node_rows = vec![None; circuit.nodes().len()];
        let mut row_nodes = Vec::new();
        for node in circuit.nodes() {
            if !node.is_reference() {
                node_rows[node.id.slot()] = Some(row_nodes.len());
                row_nodes.push(node.id);
            }
        }

        let mut source_rows = vec![None; circuit.paths().len()];
        let mut row_sources = Vec::new();
        for path in circuit.paths() {
            if path.kind == ElementKind::PotentialSource {
                source_rows[path.id.slot()] = Some(row_nodes.len() + row_sources.len());
                row_sources.push(path.id);
            }
        }

        Self {
            node_rows,
            source_rows,
            row_nodes,
            row_sources,
        }
    }

    /// Total number of unknowns.
    pub fn len(&self) -> usize {
        self.row_nodes.len() + self.row_sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of solved node potentials.
    pub fn node_count(&self) -> usize {
        self.row_nodes.len()
    }

    /// Row of a node's potential, `None` for reference nodes.
    pub fn node_row(&self, id: NodeId) -> Option<usize> {
        self.node_rows.get(id.slot()).copied().flatten()
    }

    /// Row of a potential source's flow.
    pub fn source_row(&self, id: PathId) -> Option<usize> {
        self.source_rows.get(id.slot()).copied().flatten()
    }

    /// Solved nodes in row order.
    pub fn row_nodes(&self) -> &[NodeId] {
        &self.row_nodes
    }

    /// Potential sources in row order.
    pub fn row_sources(&self) -> &[PathId] {
        &self.row_sources
    }
}
