//! pf-compartment: hierarchical compartments over circuit nodes.
//!
//! Provides:
//! - An arena `CompartmentGraph` with parent/child hierarchy and cached leaves
//! - Links between compartments, optionally bound to circuit paths
//! - Substance registry and per-compartment substance quantities
//! - Volume-weighted aggregation over leaves
//! - Donor-cell substance transport and gas/liquid balancing

pub mod balance;
pub mod compartment;
pub mod error;
pub mod graph;
pub mod ids;
pub mod quantity;
pub mod substance;
pub mod transport;

pub use balance::{BalanceGasBy, BalanceLiquidBy};
pub use compartment::{Compartment, Link};
pub use error::{CompartmentError, CompartmentResult};
pub use graph::CompartmentGraph;
pub use ids::{CompartmentId, GraphKey, LinkId};
pub use quantity::SubstanceQuantity;
pub use substance::{Phase, Substance, SubstanceRegistry};
