//! Integration tests for circuit solving across domains.

use pf_circuit::{
    CircuitBuilder, CircuitError, Domain, Electrical, Fluid, SolveOptions, SwitchState, Thermal,
};
use proptest::prelude::*;

/// Source -> R -> (A) -> R -> (B) -> R -> ground, with a shunt at each node.
fn ladder<D: Domain>(drive: f64, series: &[f64], shunt: &[f64]) -> pf_circuit::Circuit<D> {
    let mut b = CircuitBuilder::<D>::new("ladder");
    let ground = b.add_reference_node("Ground", None);
    let mut prev = b.add_node("Drive");
    b.add_potential_source("Source", ground, prev, drive);
    for (i, (&rs, &rp)) in series.iter().zip(shunt).enumerate() {
        let node = b.add_node(format!("N{i}"));
        b.add_resistor(format!("Series{i}"), prev, node, rs);
        b.add_resistor(format!("Shunt{i}"), node, ground, rp);
        prev = node;
    }
    b.build().unwrap()
}

#[test]
fn internal_nodes_conserve_flow() {
    let mut c = ladder::<Fluid>(100.0, &[1.0, 2.0, 3.0], &[10.0, 20.0, 5.0]);
    c.solve(0.02, &SolveOptions::default()).unwrap();
    c.commit();

    for node in c.nodes().iter().filter(|n| !n.is_reference()) {
        assert!(
            c.net_inflow(node.id).abs() < 1e-9,
            "node {} leaks {}",
            node.name,
            c.net_inflow(node.id)
        );
    }
}

#[test]
fn open_switch_carries_no_flow() {
    let mut b = CircuitBuilder::<Electrical>::new("switch");
    let ground = b.add_reference_node("Ground", None);
    let hi = b.add_node("Hi");
    let lo = b.add_node("Lo");
    b.add_potential_source("Supply", ground, hi, 1.0e6);
    let sw = b.add_switch("Breaker", hi, lo, SwitchState::Open);
    b.add_resistor("Load", lo, ground, 1.0);
    let mut c = b.build().unwrap();

    c.solve(0.02, &SolveOptions::default()).unwrap();
    c.commit();
    assert!(c.path(sw).unwrap().flow().unwrap().abs() < 1e-12);

    // Closing it lets current through on the next step.
    c.set_next_switch(sw, SwitchState::Closed).unwrap();
    c.solve(0.02, &SolveOptions::default()).unwrap();
    c.commit();
    assert!(c.path(sw).unwrap().flow().unwrap() > 1.0e5);
}

#[test]
fn reads_do_not_change_state() {
    let mut c = ladder::<Thermal>(5.0, &[1.0], &[1.0]);
    c.solve(0.02, &SolveOptions::default()).unwrap();
    c.commit();
    let n0 = c.node_by_name("N0").unwrap();
    let before = c.nodes().to_vec();

    let first = c.node(n0).unwrap().potential();
    let again = c.node(n0).unwrap().potential();
    assert_eq!(first, again);
    assert_eq!(c.potential(n0), c.potential(n0));
    assert_eq!(c.nodes(), before.as_slice());
}

#[test]
fn every_domain_shares_one_solver() {
    fn load_flow<D: Domain>() -> f64 {
        let mut c = ladder::<D>(10.0, &[1.0], &[4.0]);
        c.solve(1.0, &SolveOptions::default()).unwrap();
        c.commit();
        let shunt = c.path_by_name("Shunt0").unwrap();
        c.path(shunt).unwrap().flow().unwrap()
    }

    let fluid = load_flow::<Fluid>();
    let thermal = load_flow::<Thermal>();
    let electrical = load_flow::<Electrical>();
    assert!((fluid - 2.0).abs() < 1e-9);
    assert_eq!(fluid, thermal);
    assert_eq!(fluid, electrical);
}

#[test]
fn typed_readback_uses_domain_units() {
    use pf_core::units::base;

    let mut c = ladder::<Fluid>(80.0, &[1.0], &[1.0]);
    c.solve(0.02, &SolveOptions::default()).unwrap();
    c.commit();
    let n0 = c.node_by_name("N0").unwrap();
    let p = c.potential(n0).unwrap();
    assert!((base::mmhg_of(p) - 40.0).abs() < 1e-9);
}

#[test]
fn failed_solve_leaves_committed_state() {
    let mut b = CircuitBuilder::<Fluid>::new("conflict");
    let ground = b.add_reference_node("Ground", None);
    let a = b.add_node("A");
    b.add_potential_source("S1", ground, a, 10.0);
    b.add_potential_source("S2", ground, a, 20.0);
    let mut c = b.build().unwrap();

    let err = c.solve(0.02, &SolveOptions::default()).unwrap_err();
    assert!(matches!(err, CircuitError::Singular { .. }));
    c.commit();
    assert!(!c.node(a).unwrap().has_potential());
}

proptest! {
    #[test]
    fn ladder_conserves_flow(
        drive in -200.0f64..200.0,
        series in proptest::collection::vec(0.01f64..100.0, 1..6),
        shunt_scale in 0.1f64..50.0,
    ) {
        let shunt: Vec<f64> = series.iter().map(|r| r * shunt_scale).collect();
        let mut c = ladder::<Fluid>(drive, &series, &shunt);
        c.solve(0.02, &SolveOptions::default()).unwrap();
        c.commit();
        for node in c.nodes().iter().filter(|n| !n.is_reference()) {
            prop_assert!(c.net_inflow(node.id).abs() < 1e-9 * (1.0 + drive.abs()));
        }
    }
}
