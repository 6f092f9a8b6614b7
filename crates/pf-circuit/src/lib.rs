//! pf-circuit: lumped-element circuits shared by every physical domain.
//!
//! Provides:
//! - Node / Path elements with staged ("next") and committed values
//! - Incremental circuit builder with validation
//! - A `Domain` trait that parameterizes one solver over fluid, thermal and
//!   electrical analogies
//! - Modified nodal analysis solve with backward-Euler capacitors and valves
//!
//! # Example
//!
//! ```
//! use pf_circuit::{CircuitBuilder, Fluid, SolveOptions};
//!
//! let mut builder = CircuitBuilder::<Fluid>::new("demo");
//! let ground = builder.add_reference_node("Ground", Some(0.0));
//! let n1 = builder.add_node("Pump");
//! builder.add_potential_source("Drive", ground, n1, 100.0);
//! builder.add_resistor("Load", n1, ground, 10.0);
//! let mut circuit = builder.build().unwrap();
//!
//! circuit.solve(0.02, &SolveOptions::default()).unwrap();
//! circuit.commit();
//! let load = circuit.path_by_name("Load").unwrap();
//! assert!((circuit.path(load).unwrap().flow().unwrap() - 10.0).abs() < 1e-9);
//! ```

pub mod builder;
pub mod calculator;
pub mod circuit;
pub mod domain;
pub mod element;
pub mod error;
pub mod indexing;
pub mod staged;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::CircuitBuilder;
pub use calculator::{SolveOptions, SolveReport};
pub use circuit::{Circuit, ElectricalCircuit, FluidCircuit, ThermalCircuit};
pub use domain::{Domain, DomainKind, Electrical, Fluid, SwitchResistances, Thermal};
pub use element::{ElementKind, Node, Path, SwitchState};
pub use error::{CircuitError, CircuitResult};
pub use indexing::UnknownMap;
pub use staged::Staged;
