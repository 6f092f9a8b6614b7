//! Circuit validation logic.

use std::collections::HashSet;

use crate::element::{ElementKind, Node, Path};
use crate::error::{CircuitError, CircuitResult};

/// Validate the circuit structure: names unique, all references exist,
/// element values are usable, at least one reference node.
pub(crate) fn validate_structure(
    circuit: &str,
    nodes: &[Node],
    paths: &[Path],
) -> CircuitResult<()> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.name.as_str()) {
            return Err(CircuitError::DuplicateName {
                circuit: circuit.to_string(),
                what: "node",
                name: node.name.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for path in paths {
        if !seen.insert(path.name.as_str()) {
            return Err(CircuitError::DuplicateName {
                circuit: circuit.to_string(),
                what: "path",
                name: path.name.clone(),
            });
        }
    }

    for path in paths {
        for node in [path.source, path.target] {
            if node.slot() >= nodes.len() {
                return Err(CircuitError::InvalidNodeRef {
                    circuit: circuit.to_string(),
                    path: path.id,
                    node,
                });
            }
        }
        if path.source == path.target {
            return Err(CircuitError::SelfLoop {
                circuit: circuit.to_string(),
                path: path.name.clone(),
            });
        }
        if let Some(value) = path.value.get() {
            check_element_value(circuit, path, value)?;
        }
    }

    if !nodes.iter().any(|n| n.reference) {
        return Err(CircuitError::NoReferenceNode {
            circuit: circuit.to_string(),
        });
    }

    Ok(())
}

/// Every solved node must touch at least one path, otherwise its row in
/// the nodal matrix is empty.
pub(crate) fn validate_connectivity(
    circuit: &str,
    nodes: &[Node],
    node_path_offsets: &[usize],
) -> CircuitResult<()> {
    for node in nodes {
        let idx = node.id.slot();
        let degree = node_path_offsets[idx + 1] - node_path_offsets[idx];
        if degree == 0 && !node.reference {
            return Err(CircuitError::IsolatedNode {
                circuit: circuit.to_string(),
                node: node.name.clone(),
            });
        }
    }
    Ok(())
}

/// Check a resistance, capacitance or source value before it is staged.
pub(crate) fn check_element_value(circuit: &str, path: &Path, value: f64) -> CircuitResult<()> {
    let bad = !value.is_finite() || (path.kind.needs_positive_value() && value <= 0.0);
    if bad || matches!(path.kind, ElementKind::Switch | ElementKind::Valve) {
        return Err(CircuitError::InvalidElementValue {
            circuit: circuit.to_string(),
            path: path.name.clone(),
            kind: path.kind.name(),
            value,
        });
    }
    Ok(())
}
