//! Modified nodal analysis shared by every domain.
//!
//! Unknowns are the potentials of solved nodes plus the flow through each
//! potential source. Capacitors use a backward-Euler companion model
//! (conductance C/dt with a history injection); switches and valves are
//! resistors whose value comes from their state. Valve states are iterated
//! until they agree with the solution.

use nalgebra::{DMatrix, DVector};
use pf_core::{NodeId, Real, ZERO_APPROX};
use tracing::debug;

use crate::circuit::Circuit;
use crate::domain::{Domain, SwitchResistances};
use crate::element::{ElementKind, Path, SwitchState};
use crate::error::{CircuitError, CircuitResult};
use crate::indexing::UnknownMap;

/// Solver configuration.
#[derive(Clone, Debug)]
pub struct SolveOptions {
    /// Maximum number of valve-state passes before giving up.
    pub max_valve_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_valve_iterations: 25,
        }
    }
}

/// What a solve did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolveReport {
    /// Size of the nodal system.
    pub unknowns: usize,
    /// Number of assemble/solve passes (1 when no valve changed state).
    pub passes: usize,
}

/// Solve the circuit's staged values and stage the resulting potentials,
/// flows, valve states and node quantities. Nothing is committed.
///
/// On error nothing is staged.
pub(crate) fn solve<D: Domain>(
    circuit: &mut Circuit<D>,
    dt: Real,
    options: &SolveOptions,
) -> CircuitResult<SolveReport> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(CircuitError::InvalidTimeStep {
            circuit: circuit.name.clone(),
            dt,
        });
    }

    let map = UnknownMap::from_circuit(circuit);
    let fixed = imposed_potentials(circuit);
    let previous = previous_potentials(circuit, &fixed);
    let mut valves: Vec<Option<SwitchState>> = circuit
        .paths
        .iter()
        .map(|p| match p.kind {
            ElementKind::Valve => Some(p.next_state().unwrap_or(SwitchState::Closed)),
            _ => None,
        })
        .collect();

    let max_passes = options.max_valve_iterations.max(1);
    for pass in 1..=max_passes {
        let (a, b) = assemble(circuit, &map, &fixed, &previous, &valves, dt)?;
        let x = if map.is_empty() {
            DVector::zeros(0)
        } else {
            a.lu().solve(&b).ok_or_else(|| CircuitError::Singular {
                circuit: circuit.name.clone(),
            })?
        };
        if let Some(row) = x.iter().position(|v| !v.is_finite()) {
            return Err(CircuitError::NonFinite {
                circuit: circuit.name.clone(),
                what: format!("unknown in row {row}"),
            });
        }

        let potentials: Vec<Real> = circuit
            .nodes
            .iter()
            .map(|n| map.node_row(n.id).map_or(fixed[n.id.slot()], |row| x[row]))
            .collect();
        let flows = path_flows(circuit, &map, &x, &potentials, &previous, &valves, dt)?;

        if update_valves(&circuit.paths, &potentials, &flows, &mut valves) {
            continue;
        }

        let quantities = integrate_quantities(circuit, &flows, dt)?;
        write_back(circuit, &potentials, &flows, &valves, &quantities);
        debug!(
            circuit = %circuit.name,
            unknowns = map.len(),
            passes = pass,
            "circuit solved"
        );
        return Ok(SolveReport {
            unknowns: map.len(),
            passes: pass,
        });
    }

    Err(CircuitError::ValveNonConvergence {
        circuit: circuit.name.clone(),
        iterations: max_passes,
    })
}

/// Potential of every node that is not solved for (reference nodes).
fn imposed_potentials<D: Domain>(circuit: &Circuit<D>) -> Vec<Real> {
    circuit
        .nodes
        .iter()
        .map(|n| {
            if n.is_reference() {
                n.potential.next_or_current().unwrap_or(D::ZERO_POTENTIAL)
            } else {
                D::ZERO_POTENTIAL
            }
        })
        .collect()
}

/// Potentials at the start of the step, for capacitor history terms.
fn previous_potentials<D: Domain>(circuit: &Circuit<D>, fixed: &[Real]) -> Vec<Real> {
    circuit
        .nodes
        .iter()
        .map(|n| {
            n.potential()
                .or_else(|| n.next_potential())
                .unwrap_or(fixed[n.id.slot()])
        })
        .collect()
}

/// Conductance of a resistive element under the given valve state.
fn conductance(
    circuit: &str,
    path: &Path,
    valve: Option<SwitchState>,
    resistances: SwitchResistances,
    dt: Real,
) -> CircuitResult<Option<Real>> {
    let switched = |state: SwitchState| {
        if state.is_closed() {
            1.0 / resistances.closed
        } else {
            1.0 / resistances.open
        }
    };
    let g = match path.kind {
        ElementKind::Resistor => 1.0 / element_value(circuit, path)?,
        ElementKind::Capacitor => element_value(circuit, path)? / dt,
        ElementKind::Switch => switched(path.next_state().unwrap_or(SwitchState::Open)),
        ElementKind::Valve => switched(valve.unwrap_or(SwitchState::Closed)),
        ElementKind::FlowSource | ElementKind::PotentialSource => return Ok(None),
    };
    Ok(Some(g))
}

fn element_value(circuit: &str, path: &Path) -> CircuitResult<Real> {
    match path.next_value() {
        Some(v) if v.is_finite() => Ok(v),
        other => Err(CircuitError::InvalidElementValue {
            circuit: circuit.to_string(),
            path: path.name.clone(),
            kind: path.kind.name(),
            value: other.unwrap_or(Real::NAN),
        }),
    }
}

fn assemble<D: Domain>(
    circuit: &Circuit<D>,
    map: &UnknownMap,
    fixed: &[Real],
    previous: &[Real],
    valves: &[Option<SwitchState>],
    dt: Real,
) -> CircuitResult<(DMatrix<Real>, DVector<Real>)> {
    let n = map.len();
    let mut a = DMatrix::zeros(n, n);
    let mut b = DVector::zeros(n);

    for path in &circuit.paths {
        let (s, t) = (path.source, path.target);
        match path.kind {
            ElementKind::FlowSource => {
                let q = element_value(&circuit.name, path)?;
                stamp_injection(&mut b, map, s, t, q);
            }
            ElementKind::PotentialSource => {
                let rise = element_value(&circuit.name, path)?;
                let Some(r) = map.source_row(path.id) else {
                    continue;
                };
                match map.node_row(s) {
                    Some(i) => {
                        a[(i, r)] += 1.0;
                        a[(r, i)] -= 1.0;
                    }
                    None => b[r] += fixed[s.slot()],
                }
                match map.node_row(t) {
                    Some(j) => {
                        a[(j, r)] -= 1.0;
                        a[(r, j)] += 1.0;
                    }
                    None => b[r] -= fixed[t.slot()],
                }
                b[r] += rise;
            }
            _ => {
                let Some(g) = conductance(
                    &circuit.name,
                    path,
                    valves[path.id.slot()],
                    circuit.resistances,
                    dt,
                )?
                else {
                    continue;
                };
                stamp_conductance(&mut a, &mut b, map, fixed, s, t, g);
                if path.kind == ElementKind::Capacitor {
                    let history = g * (previous[s.slot()] - previous[t.slot()]);
                    stamp_injection(&mut b, map, s, t, -history);
                }
            }
        }
    }

    Ok((a, b))
}

/// Stamp a conductance `g` carrying `g * (Vs - Vt)` from `s` to `t`.
fn stamp_conductance(
    a: &mut DMatrix<Real>,
    b: &mut DVector<Real>,
    map: &UnknownMap,
    fixed: &[Real],
    s: NodeId,
    t: NodeId,
    g: Real,
) {
    let rs = map.node_row(s);
    let rt = map.node_row(t);
    if let Some(i) = rs {
        a[(i, i)] += g;
        match rt {
            Some(j) => a[(i, j)] -= g,
            None => b[i] += g * fixed[t.slot()],
        }
    }
    if let Some(j) = rt {
        a[(j, j)] += g;
        match rs {
            Some(i) => a[(j, i)] -= g,
            None => b[j] += g * fixed[s.slot()],
        }
    }
}

/// Stamp a known flow `q` from `s` to `t`.
fn stamp_injection(b: &mut DVector<Real>, map: &UnknownMap, s: NodeId, t: NodeId, q: Real) {
    if let Some(i) = map.node_row(s) {
        b[i] -= q;
    }
    if let Some(j) = map.node_row(t) {
        b[j] += q;
    }
}

fn path_flows<D: Domain>(
    circuit: &Circuit<D>,
    map: &UnknownMap,
    x: &DVector<Real>,
    potentials: &[Real],
    previous: &[Real],
    valves: &[Option<SwitchState>],
    dt: Real,
) -> CircuitResult<Vec<Real>> {
    let mut flows = Vec::with_capacity(circuit.paths.len());
    for path in &circuit.paths {
        let (s, t) = (path.source.slot(), path.target.slot());
        let drop = potentials[s] - potentials[t];
        let q = match path.kind {
            ElementKind::FlowSource => element_value(&circuit.name, path)?,
            ElementKind::PotentialSource => map.source_row(path.id).map_or(0.0, |r| x[r]),
            ElementKind::Capacitor => {
                let g = element_value(&circuit.name, path)? / dt;
                g * (drop - (previous[s] - previous[t]))
            }
            _ => {
                let g = conductance(
                    &circuit.name,
                    path,
                    valves[path.id.slot()],
                    circuit.resistances,
                    dt,
                )?
                .unwrap_or(0.0);
                g * drop
            }
        };
        if !q.is_finite() {
            return Err(CircuitError::NonFinite {
                circuit: circuit.name.clone(),
                what: format!("flow on path '{}'", path.name),
            });
        }
        flows.push(q);
    }
    Ok(flows)
}

/// Flip valves whose state disagrees with the solution. Returns whether
/// anything changed.
fn update_valves(
    paths: &[Path],
    potentials: &[Real],
    flows: &[Real],
    valves: &mut [Option<SwitchState>],
) -> bool {
    let mut changed = false;
    for path in paths.iter().filter(|p| p.kind == ElementKind::Valve) {
        let slot = path.id.slot();
        let drop = potentials[path.source.slot()] - potentials[path.target.slot()];
        let next = match valves[slot] {
            Some(SwitchState::Closed) if flows[slot] < -ZERO_APPROX => SwitchState::Open,
            Some(SwitchState::Open) if drop > ZERO_APPROX => SwitchState::Closed,
            Some(state) => state,
            None => SwitchState::Closed,
        };
        if valves[slot] != Some(next) {
            valves[slot] = Some(next);
            changed = true;
        }
    }
    changed
}

/// Integrate capacitor flow into the quantity stored on each capacitor's
/// source node.
fn integrate_quantities<D: Domain>(
    circuit: &Circuit<D>,
    flows: &[Real],
    dt: Real,
) -> CircuitResult<Vec<Option<Real>>> {
    let mut quantities: Vec<Option<Real>> = vec![None; circuit.nodes.len()];
    for path in circuit.paths.iter().filter(|p| p.kind == ElementKind::Capacitor) {
        let node = &circuit.nodes[path.source.slot()];
        let Some(start) = node.quantity() else {
            continue;
        };
        let slot = path.source.slot();
        let acc = quantities[slot].get_or_insert(start);
        *acc += flows[path.id.slot()] * dt;
    }
    if let Some(slot) = quantities
        .iter()
        .position(|q| q.is_some_and(|v| !v.is_finite()))
    {
        return Err(CircuitError::NonFinite {
            circuit: circuit.name.clone(),
            what: format!("quantity on node '{}'", circuit.nodes[slot].name),
        });
    }
    Ok(quantities)
}

fn write_back<D: Domain>(
    circuit: &mut Circuit<D>,
    potentials: &[Real],
    flows: &[Real],
    valves: &[Option<SwitchState>],
    quantities: &[Option<Real>],
) {
    for (node, &p) in circuit.nodes.iter_mut().zip(potentials) {
        node.potential.set_next(p);
        if let Some(q) = quantities[node.id.slot()] {
            node.quantity.set_next(q);
        }
    }
    for (path, &q) in circuit.paths.iter_mut().zip(flows) {
        path.flow.set_next(q);
        if let Some(state) = valves[path.id.slot()] {
            path.state.set_next(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CircuitBuilder;
    use crate::domain::{Electrical, Fluid, Thermal};

    #[test]
    fn voltage_divider() {
        let mut b = CircuitBuilder::<Electrical>::new("divider");
        let g = b.add_reference_node("Ground", None);
        let top = b.add_node("Top");
        let mid = b.add_node("Mid");
        b.add_potential_source("V", g, top, 12.0);
        b.add_resistor("R1", top, mid, 2.0);
        let r2 = b.add_resistor("R2", mid, g, 1.0);
        let mut c = b.build().unwrap();

        let report = c.solve(1.0, &SolveOptions::default()).unwrap();
        assert_eq!(report.unknowns, 3);
        c.commit();
        assert!((c.node(mid).unwrap().potential().unwrap() - 4.0).abs() < 1e-9);
        assert!((c.path(r2).unwrap().flow().unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn flow_source_into_resistor() {
        let mut b = CircuitBuilder::<Thermal>::new("heat");
        let amb = b.add_reference_node("Ambient", Some(293.15));
        let core = b.add_node("Core");
        b.add_flow_source("Metabolism", amb, core, 100.0);
        b.add_resistor("Skin", core, amb, 0.05);
        let mut c = b.build().unwrap();

        c.solve(1.0, &SolveOptions::default()).unwrap();
        c.commit();
        // 100 W through 0.05 K/W raises the core 5 K above ambient
        assert!((c.node(core).unwrap().potential().unwrap() - 298.15).abs() < 1e-9);
    }

    #[test]
    fn capacitor_charges_toward_source() {
        let mut b = CircuitBuilder::<Fluid>::new("rc");
        let g = b.add_reference_node("Ground", Some(0.0));
        let drive = b.add_node("Drive");
        let tank = b.add_node("Tank");
        b.set_node_potential(tank, 0.0);
        b.set_node_quantity(tank, 100.0);
        b.add_potential_source("Pump", g, drive, 10.0);
        b.add_resistor("R", drive, tank, 1.0);
        let cap = b.add_capacitor("C", tank, g, 1.0);
        let mut c = b.build().unwrap();

        let mut last = 0.0;
        for _ in 0..50 {
            c.solve(0.1, &SolveOptions::default()).unwrap();
            c.commit();
            let p = c.node(tank).unwrap().potential().unwrap();
            assert!(p >= last - 1e-12 && p <= 10.0 + 1e-9);
            last = p;
        }
        assert!(last > 9.0);
        // stored volume grew by C * dP
        let vol = c.node(tank).unwrap().quantity().unwrap();
        assert!((vol - (100.0 + last)).abs() < 1e-6);
        assert!(c.path(cap).unwrap().flow().unwrap() > 0.0);
    }

    #[test]
    fn valve_blocks_reverse_flow() {
        let mut b = CircuitBuilder::<Fluid>::new("valve");
        let g = b.add_reference_node("Ground", Some(0.0));
        let hi = b.add_node("High");
        let mid = b.add_node("Mid");
        b.add_potential_source("Back", hi, g, 50.0);
        b.add_resistor("Feed", hi, mid, 1.0);
        let v = b.add_valve("Check", mid, g);
        b.add_resistor("Leak", mid, g, 1.0);
        let mut c = b.build().unwrap();

        // "Back" pulls High to -50, so Check sees reverse flow and must open.
        let report = c.solve(0.02, &SolveOptions::default()).unwrap();
        assert!(report.passes >= 2);
        c.commit();
        assert_eq!(c.path(v).unwrap().state(), Some(SwitchState::Open));
        assert!(c.path(v).unwrap().flow().unwrap().abs() < 1e-12);
    }

    #[test]
    fn floating_subnetwork_is_singular() {
        let mut b = CircuitBuilder::<Electrical>::new("float");
        let g = b.add_reference_node("Ground", None);
        let a = b.add_node("A");
        let x = b.add_node("X");
        let y = b.add_node("Y");
        b.add_resistor("R", g, a, 1.0);
        b.add_flow_source("I", x, y, 1.0);
        let mut c = b.build().unwrap();
        let err = c.solve(0.02, &SolveOptions::default()).unwrap_err();
        assert!(matches!(err, CircuitError::Singular { .. }));
        assert!(err.severity().is_fatal());
        assert!(!c.node(a).unwrap().has_potential());
    }

    #[test]
    fn rejects_bad_time_step() {
        let mut b = CircuitBuilder::<Fluid>::new("dt");
        let g = b.add_reference_node("G", None);
        let a = b.add_node("A");
        b.add_resistor("R", g, a, 1.0);
        let mut c = b.build().unwrap();
        assert!(matches!(
            c.solve(0.0, &SolveOptions::default()),
            Err(CircuitError::InvalidTimeStep { .. })
        ));
    }
}
