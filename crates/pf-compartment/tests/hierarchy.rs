//! Integration tests for compartment hierarchy, links and aggregation.

use pf_circuit::{CircuitBuilder, Fluid, SolveOptions, Thermal};
use pf_compartment::{BalanceLiquidBy, CompartmentGraph, Phase, SubstanceRegistry};

#[test]
fn leaves_follow_insertions_at_every_level() {
    // Body -> {Torso -> {Chest, Abdomen}, Head}
    let mut g = CompartmentGraph::<Thermal>::new("Body");
    let body = g.add_compartment("Body").unwrap();
    let torso = g.add_compartment("Torso").unwrap();
    let head = g.add_compartment("Head").unwrap();
    let chest = g.add_compartment("Chest").unwrap();
    let abdomen = g.add_compartment("Abdomen").unwrap();
    g.add_child(body, torso).unwrap();
    g.add_child(body, head).unwrap();
    g.add_child(torso, chest).unwrap();
    g.add_child(torso, abdomen).unwrap();

    assert_eq!(g.leaves(body).unwrap(), vec![chest, abdomen, head]);
    assert_eq!(g.leaves(torso).unwrap(), vec![chest, abdomen]);
    assert_eq!(g.leaves(head).unwrap(), vec![head]);

    // Insert a new leaf under the internal node; both ancestors see it.
    let pelvis = g.add_compartment("Pelvis").unwrap();
    g.add_child(torso, pelvis).unwrap();
    assert_eq!(g.leaves(torso).unwrap(), vec![chest, abdomen, pelvis]);
    assert_eq!(g.leaves(body).unwrap(), vec![chest, abdomen, pelvis, head]);

    // Splitting a leaf turns it into a parent.
    let brain = g.add_compartment("Brain").unwrap();
    g.add_child(head, brain).unwrap();
    assert_eq!(g.leaves(head).unwrap(), vec![brain]);
    assert_eq!(g.leaves(body).unwrap(), vec![chest, abdomen, pelvis, brain]);
    assert_eq!(g.compartment(brain).unwrap().parent(), Some(head));
}

#[test]
fn links_keep_directed_lists() {
    let mut g = CompartmentGraph::<Thermal>::new("G");
    let a = g.add_compartment("A").unwrap();
    let b = g.add_compartment("B").unwrap();
    let ab = g.add_link("AtoB", a, b).unwrap();
    let ba = g.add_link("BtoA", b, a).unwrap();

    let ca = g.compartment(a).unwrap();
    assert_eq!(ca.links(), &[ab, ba]);
    assert_eq!(ca.outgoing(), &[ab]);
    assert_eq!(ca.incoming(), &[ba]);

    let removed = g.remove_link(ab).unwrap();
    assert_eq!(removed.name, "AtoB");
    assert!(g.link(ab).is_none());
    assert!(g.link_by_name("AtoB").is_none());
    assert_eq!(g.compartment(a).unwrap().links(), &[ba]);
    assert!(g.compartment(b).unwrap().incoming().is_empty());
    assert!(g.remove_link(ab).is_err());
}

#[test]
fn parent_values_are_volume_weighted() {
    let mut reg = SubstanceRegistry::new();
    let glucose = reg.register("Glucose", Phase::Liquid).unwrap();
    let mut g = CompartmentGraph::liquid("Vascular");
    let trunk = g.add_compartment("Trunk").unwrap();
    let big = g.add_compartment("Big").unwrap();
    let small = g.add_compartment("Small").unwrap();
    g.add_child(trunk, big).unwrap();
    g.add_child(trunk, small).unwrap();
    g.activate_substance(reg.get(glucose).unwrap()).unwrap();

    g.set_quantity(big, 300.0).unwrap();
    g.set_quantity(small, 100.0).unwrap();
    g.set_potential(big, 10.0).unwrap();
    g.set_potential(small, 50.0).unwrap();
    g.substance_mut(big, glucose).unwrap().set_mass(3.0);
    g.substance_mut(small, glucose).unwrap().set_mass(3.0);
    g.balance_liquid(big, BalanceLiquidBy::Mass).unwrap();
    g.balance_liquid(small, BalanceLiquidBy::Mass).unwrap();

    assert_eq!(g.quantity(trunk), Some(400.0));
    assert!((g.potential(trunk).unwrap() - 20.0).abs() < 1e-12);
    let agg = g.substance(trunk, glucose).unwrap();
    assert!((agg.mass().unwrap() - 6.0).abs() < 1e-12);
    // 6 mass units over 400 volume
    assert!((agg.concentration().unwrap() - 0.015).abs() < 1e-12);
    assert!((g.get_scalar(trunk, "Glucose.Concentration").unwrap() - 0.015).abs() < 1e-12);
    assert!((g.get_scalar(trunk, "Glucose-Mass").unwrap() - 6.0).abs() < 1e-12);
    assert_eq!(g.get_scalar(trunk, "Pressure"), g.potential(trunk));
    assert_eq!(g.get_scalar(trunk, "Glucose.Colour"), None);
    assert_eq!(g.get_scalar(trunk, "Insulin.Mass"), None);
}

#[test]
fn sync_reads_committed_circuit_values() {
    let mut b = CircuitBuilder::<Fluid>::new("Lungs");
    let amb = b.add_reference_node("Ambient", Some(0.0));
    let mouth = b.add_node("Mouth");
    let alv = b.add_node("Alveoli");
    b.set_node_potential(alv, 0.0);
    b.set_node_quantity(alv, 2000.0);
    b.add_potential_source("Driver", amb, mouth, 5.0);
    let airway = b.add_resistor("Airway", mouth, alv, 1.0);
    b.add_capacitor("Compliance", alv, amb, 100.0);
    let mut c = b.build().unwrap();

    let mut g = CompartmentGraph::gas("Respiratory");
    let env = g.add_compartment("Environment").unwrap();
    let lung = g.add_compartment("Lung").unwrap();
    g.map_node(lung, alv).unwrap();
    g.map_node(env, amb).unwrap();
    let link = g.add_link("Airway", env, lung).unwrap();
    g.bind_path(link, airway).unwrap();

    c.solve(0.02, &SolveOptions::default()).unwrap();
    g.sync_from_circuit(&c).unwrap();
    assert_eq!(g.link(link).unwrap().flow(), None, "nothing committed yet");

    c.commit();
    g.sync_from_circuit(&c).unwrap();
    let q = g.link(link).unwrap().flow().unwrap();
    assert!(q > 0.0);
    assert_eq!(g.in_flow(lung), Some(q));
    assert_eq!(g.out_flow(lung), Some(0.0));
    assert_eq!(g.out_flow(env), Some(q));
    assert!(g.quantity(lung).unwrap() > 2000.0);
    assert!(g.potential(lung).unwrap() > 0.0);
}
