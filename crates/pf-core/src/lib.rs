//! pf-core: shared vocabulary of the physioflow crates.
//!
//! - `ids`: arena handles for nodes, paths and substances
//! - `numeric`: `Real`, tolerances, finiteness and clamping helpers
//! - `units`: `uom` quantities in each domain's base units
//! - `error`: `PfError` and the `Severity` every error reports

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

pub use error::{PfError, PfResult, Severity};
pub use ids::*;
pub use numeric::*;
pub use units::*;
