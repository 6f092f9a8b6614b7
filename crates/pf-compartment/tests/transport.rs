//! Integration tests for donor-cell transport.

use pf_circuit::Fluid;
use pf_compartment::{
    BalanceLiquidBy, CompartmentGraph, CompartmentId, LinkId, Phase, SubstanceRegistry,
};
use pf_core::SubstanceId;
use proptest::prelude::*;

struct Chain {
    graph: CompartmentGraph<Fluid>,
    cmpts: Vec<CompartmentId>,
    links: Vec<LinkId>,
    solute: SubstanceId,
}

/// Three liquid compartments in a line with some solute in each.
fn liquid_chain(masses: [f64; 3]) -> Chain {
    let mut reg = SubstanceRegistry::new();
    let solute = reg.register("Sodium", Phase::Liquid).unwrap();
    let mut graph = CompartmentGraph::liquid("Chain");
    let cmpts: Vec<CompartmentId> = ["A", "B", "C"]
        .iter()
        .map(|n| graph.add_compartment(*n).unwrap())
        .collect();
    graph.activate_substance(reg.get(solute).unwrap()).unwrap();
    for (&c, m) in cmpts.iter().zip(masses) {
        graph.set_quantity(c, 100.0).unwrap();
        graph.substance_mut(c, solute).unwrap().set_mass(m);
        graph.balance_liquid(c, BalanceLiquidBy::Mass).unwrap();
    }
    let links = vec![
        graph.add_link("AB", cmpts[0], cmpts[1]).unwrap(),
        graph.add_link("BC", cmpts[1], cmpts[2]).unwrap(),
    ];
    Chain {
        graph,
        cmpts,
        links,
        solute,
    }
}

fn total_mass(chain: &Chain) -> f64 {
    chain
        .cmpts
        .iter()
        .map(|&c| chain.graph.substance(c, chain.solute).unwrap().mass().unwrap())
        .sum()
}

#[test]
fn donor_follows_flow_direction() {
    let mut chain = liquid_chain([10.0, 0.0, 0.0]);
    chain.graph.set_link_flow(chain.links[0], 50.0).unwrap();
    chain.graph.transport(0.1).unwrap();
    // 5 mL of 0.1 mg/mL leaves A
    let a = chain.graph.substance(chain.cmpts[0], chain.solute).unwrap();
    let b = chain.graph.substance(chain.cmpts[1], chain.solute).unwrap();
    assert!((a.mass().unwrap() - 9.5).abs() < 1e-12);
    assert!((b.mass().unwrap() - 0.5).abs() < 1e-12);
    assert!((b.concentration().unwrap() - 0.005).abs() < 1e-12);

    // Reverse: B is now the donor.
    chain.graph.set_link_flow(chain.links[0], -50.0).unwrap();
    chain.graph.transport(0.1).unwrap();
    let b = chain.graph.substance(chain.cmpts[1], chain.solute).unwrap();
    assert!(b.mass().unwrap() < 0.5);
    assert!((total_mass(&chain) - 10.0).abs() < 1e-12);
}

#[test]
fn transfer_is_capped_by_donor_contents() {
    let mut chain = liquid_chain([1.0, 0.0, 0.0]);
    // Carries 10x the compartment volume in one step.
    chain.graph.set_link_flow(chain.links[0], 10_000.0).unwrap();
    chain.graph.transport(0.1).unwrap();
    let a = chain.graph.substance(chain.cmpts[0], chain.solute).unwrap();
    assert_eq!(a.mass(), Some(0.0));
    assert!((total_mass(&chain) - 1.0).abs() < 1e-12);
}

#[test]
fn infinite_reservoir_keeps_its_mixture() {
    let mut reg = SubstanceRegistry::new();
    let o2 = reg.register("Oxygen", Phase::Gas).unwrap();
    let n2 = reg.register("Nitrogen", Phase::Gas).unwrap();
    let mut g = CompartmentGraph::gas("Air");
    let env = g.add_compartment("Environment").unwrap();
    let lung = g.add_compartment("Lung").unwrap();
    for s in reg.substances() {
        g.activate_substance(s).unwrap();
    }
    g.set_quantity(env, f64::INFINITY).unwrap();
    g.set_potential(env, 760.0).unwrap();
    g.set_volume_fractions(env, &[(o2, 0.21), (n2, 0.79)]).unwrap();
    g.set_quantity(lung, 2000.0).unwrap();
    g.set_potential(lung, 760.0).unwrap();
    g.set_volume_fractions(lung, &[(o2, 0.1), (n2, 0.9)]).unwrap();
    let link = g.add_link("Airway", env, lung).unwrap();

    for step in 0..100 {
        let q = if step % 2 == 0 { 500.0 } else { -400.0 };
        g.set_link_flow(link, q).unwrap();
        g.transport(0.02).unwrap();
    }

    let env_o2 = g.substance(env, o2).unwrap();
    assert_eq!(env_o2.volume_fraction(), Some(0.21));
    assert_eq!(env_o2.partial_pressure(), Some(0.21 * 760.0));
    assert_eq!(env_o2.volume(), Some(f64::INFINITY));
    let lung_o2 = g.substance(lung, o2).unwrap().volume_fraction().unwrap();
    assert!(lung_o2 > 0.1 && lung_o2 < 0.21);
    assert!((g.fraction_sum(lung).unwrap() - 1.0).abs() < 1e-9);
}

proptest! {
    #[test]
    fn transport_never_goes_negative(
        masses in proptest::array::uniform3(0.0f64..50.0),
        flows in proptest::collection::vec((-5_000.0f64..5_000.0, -5_000.0f64..5_000.0), 1..40),
    ) {
        let mut chain = liquid_chain(masses);
        let start = total_mass(&chain);
        for (ab, bc) in flows {
            chain.graph.set_link_flow(chain.links[0], ab).unwrap();
            chain.graph.set_link_flow(chain.links[1], bc).unwrap();
            chain.graph.transport(0.02).unwrap();
            for &c in &chain.cmpts {
                let q = chain.graph.substance(c, chain.solute).unwrap();
                prop_assert!(q.mass().unwrap() >= 0.0);
                prop_assert!(q.concentration().unwrap() >= 0.0);
            }
        }
        prop_assert!((total_mass(&chain) - start).abs() < 1e-9 * (1.0 + start));
    }
}
