//! Committed engine state as plain serializable data.
//!
//! A snapshot names every element, so it restores onto any engine assembled
//! from the same systems; identifiers are not carried across.

use std::path::Path;

use pf_circuit::{Circuit, Domain, SwitchState};
use pf_compartment::{CompartmentGraph, SubstanceRegistry};
use pf_core::Real;
use serde::{Deserialize, Serialize};

use crate::actions::ConditionSet;
use crate::data::{EngineData, Network};
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    pub name: String,
    pub potential: Option<Real>,
    pub quantity: Option<Real>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathSnapshot {
    pub name: String,
    pub value: Option<Real>,
    /// Switch or valve state.
    pub closed: Option<bool>,
    pub flow: Option<Real>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitSnapshot {
    pub name: String,
    pub domain: String,
    pub nodes: Vec<NodeSnapshot>,
    pub paths: Vec<PathSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubstanceSnapshot {
    pub substance: String,
    #[serde(default, with = "maybe_infinite")]
    pub volume: Option<Real>,
    #[serde(default, with = "maybe_infinite")]
    pub mass: Option<Real>,
    pub concentration: Option<Real>,
    pub volume_fraction: Option<Real>,
    pub partial_pressure: Option<Real>,
}

/// Stored values of a leaf compartment. Parents are aggregates and are
/// not stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompartmentSnapshot {
    pub name: String,
    pub potential: Option<Real>,
    #[serde(default, with = "maybe_infinite")]
    pub quantity: Option<Real>,
    pub substances: Vec<SubstanceSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSnapshot {
    pub name: String,
    pub flow: Option<Real>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub name: String,
    pub compartments: Vec<CompartmentSnapshot>,
    pub links: Vec<LinkSnapshot>,
}

/// State a system keeps outside the networks, as it saved it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    pub name: String,
    pub state: serde_json::Value,
}

/// Every committed scalar of an engine at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSnapshot {
    pub time_s: Real,
    pub step: u64,
    pub state_generation: u64,
    #[serde(default)]
    pub conditions: ConditionSet,
    pub circuits: Vec<CircuitSnapshot>,
    pub graphs: Vec<GraphSnapshot>,
    #[serde(default)]
    pub systems: Vec<SystemSnapshot>,
}

impl EngineSnapshot {
    pub(crate) fn capture(data: &EngineData) -> Self {
        let mut circuits = Vec::new();
        let mut graphs = Vec::new();
        capture_network(&data.networks.fluid, &data.substances, &mut circuits, &mut graphs);
        capture_network(&data.networks.thermal, &data.substances, &mut circuits, &mut graphs);
        capture_network(&data.networks.electrical, &data.substances, &mut circuits, &mut graphs);
        Self {
            time_s: data.time_s,
            step: data.step,
            state_generation: data.state_generation,
            conditions: data.conditions.clone(),
            circuits,
            graphs,
            systems: Vec::new(),
        }
    }

    pub fn system(&self, name: &str) -> Option<&serde_json::Value> {
        self.systems.iter().find(|s| s.name == name).map(|s| &s.state)
    }

    /// Overwrite committed state in `data`. Every circuit and graph named
    /// in the snapshot must exist with the same elements; on a mismatch
    /// `data` is left as it was. System state is the engine's to restore.
    pub(crate) fn apply(&self, data: &mut EngineData) -> SimResult<()> {
        let mut networks = data.networks.clone();
        for circuit in &self.circuits {
            let restored = restore_circuit(&mut networks.fluid, circuit)?
                || restore_circuit(&mut networks.thermal, circuit)?
                || restore_circuit(&mut networks.electrical, circuit)?;
            if !restored {
                return Err(mismatch(format!("no circuit '{}'", circuit.name)));
            }
        }
        for graph in &self.graphs {
            let substances = &data.substances;
            let restored = restore_graph(&mut networks.fluid, substances, graph)?
                || restore_graph(&mut networks.thermal, substances, graph)?
                || restore_graph(&mut networks.electrical, substances, graph)?;
            if !restored {
                return Err(mismatch(format!("no graph '{}'", graph.name)));
            }
        }
        data.networks = networks;
        data.conditions = self.conditions.clone();
        data.time_s = self.time_s;
        data.step = self.step;
        data.state_generation = data.state_generation.max(self.state_generation) + 1;
        Ok(())
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_json(&self, path: &Path) -> SimResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

fn mismatch(what: String) -> SimError {
    SimError::SnapshotMismatch { what }
}

fn capture_network<D: Domain>(
    network: &Network<D>,
    substances: &SubstanceRegistry,
    circuits: &mut Vec<CircuitSnapshot>,
    graphs: &mut Vec<GraphSnapshot>,
) {
    circuits.extend(network.circuits().iter().map(capture_circuit));
    graphs.extend(
        network
            .graphs()
            .iter()
            .map(|b| capture_graph(&b.graph, substances)),
    );
}

fn capture_circuit<D: Domain>(circuit: &Circuit<D>) -> CircuitSnapshot {
    CircuitSnapshot {
        name: circuit.name().to_string(),
        domain: D::KIND.to_string(),
        nodes: circuit
            .nodes()
            .iter()
            .map(|n| NodeSnapshot {
                name: n.name.clone(),
                potential: n.potential(),
                quantity: n.quantity(),
            })
            .collect(),
        paths: circuit
            .paths()
            .iter()
            .map(|p| PathSnapshot {
                name: p.name.clone(),
                value: p.value(),
                closed: p.state().map(SwitchState::is_closed),
                flow: p.flow(),
            })
            .collect(),
    }
}

fn capture_graph<D: Domain>(
    graph: &CompartmentGraph<D>,
    substances: &SubstanceRegistry,
) -> GraphSnapshot {
    GraphSnapshot {
        name: graph.name().to_string(),
        compartments: graph
            .compartments()
            .iter()
            .filter(|c| c.is_leaf())
            .map(|c| CompartmentSnapshot {
                name: c.name.clone(),
                potential: c.potential(),
                quantity: c.quantity(),
                substances: c
                    .substances()
                    .iter()
                    .filter_map(|q| {
                        let substance = substances.get(q.substance())?;
                        Some(SubstanceSnapshot {
                            substance: substance.name.clone(),
                            volume: q.volume(),
                            mass: q.mass(),
                            concentration: q.concentration(),
                            volume_fraction: q.volume_fraction(),
                            partial_pressure: q.partial_pressure(),
                        })
                    })
                    .collect(),
            })
            .collect(),
        links: graph
            .links()
            .map(|l| LinkSnapshot {
                name: l.name.clone(),
                flow: l.flow(),
            })
            .collect(),
    }
}

fn restore_circuit<D: Domain>(network: &mut Network<D>, snap: &CircuitSnapshot) -> SimResult<bool> {
    let Some(circuit) = network.circuit_mut(&snap.name) else {
        return Ok(false);
    };
    if snap.domain != D::KIND.to_string() {
        return Err(mismatch(format!(
            "circuit '{}' is {}, snapshot has {}",
            snap.name,
            D::KIND,
            snap.domain
        )));
    }
    if snap.nodes.len() != circuit.nodes().len() || snap.paths.len() != circuit.paths().len() {
        return Err(mismatch(format!("circuit '{}' has a different topology", snap.name)));
    }
    for node in &snap.nodes {
        let id = circuit
            .node_by_name(&node.name)
            .ok_or_else(|| mismatch(format!("no node '{}.{}'", snap.name, node.name)))?;
        circuit.restore_node(id, node.potential, node.quantity)?;
    }
    for path in &snap.paths {
        let id = circuit
            .path_by_name(&path.name)
            .ok_or_else(|| mismatch(format!("no path '{}.{}'", snap.name, path.name)))?;
        let state = path
            .closed
            .map(|closed| if closed { SwitchState::Closed } else { SwitchState::Open });
        circuit.restore_path(id, path.value, state, path.flow)?;
    }
    Ok(true)
}

fn restore_graph<D: Domain>(
    network: &mut Network<D>,
    substances: &SubstanceRegistry,
    snap: &GraphSnapshot,
) -> SimResult<bool> {
    let Some(graph) = network.graph_mut(&snap.name) else {
        return Ok(false);
    };
    for cmpt in &snap.compartments {
        let id = graph
            .compartment_by_name(&cmpt.name)
            .ok_or_else(|| mismatch(format!("no compartment '{}.{}'", snap.name, cmpt.name)))?;
        graph.restore_values(id, cmpt.potential, cmpt.quantity)?;
        for sub in &cmpt.substances {
            let sid = substances
                .by_name(&sub.substance)
                .map(|s| s.id)
                .ok_or_else(|| mismatch(format!("no substance '{}'", sub.substance)))?;
            graph.substance_mut(id, sid)?.restore(
                sub.volume,
                sub.mass,
                sub.concentration,
                sub.volume_fraction,
                sub.partial_pressure,
            );
        }
    }
    for link in &snap.links {
        let id = graph
            .link_by_name(&link.name)
            .ok_or_else(|| mismatch(format!("no link '{}.{}'", snap.name, link.name)))?;
        graph.restore_link_flow(id, link.flow)?;
    }
    Ok(true)
}

/// JSON has no infinity; reservoir volumes are written as `"inf"`.
mod maybe_infinite {
    use pf_core::Real;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(Real),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<Real>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let repr = value.map(|v| {
            if v.is_finite() {
                Repr::Number(v)
            } else if v.is_nan() {
                Repr::Text("nan".to_string())
            } else if v > 0.0 {
                Repr::Text("inf".to_string())
            } else {
                Repr::Text("-inf".to_string())
            }
        });
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Real>, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Repr::Number(v)) => Ok(Some(v)),
            Some(Repr::Text(t)) => match t.as_str() {
                "inf" => Ok(Some(Real::INFINITY)),
                "-inf" => Ok(Some(Real::NEG_INFINITY)),
                "nan" => Ok(Some(Real::NAN)),
                other => Err(D::Error::custom(format!("expected a number, got '{other}'"))),
            },
        }
    }
}
