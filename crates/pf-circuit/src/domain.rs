//! Physical domain parameterization.
//!
//! The fluid, thermal and electrical networks are the same lumped-element
//! problem with different units. A `Domain` carries the handful of things
//! that differ between them; everything else in this crate is shared.

use core::fmt;
use pf_core::Real;
use pf_core::units::{self, base};

/// Which analogy a circuit belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomainKind {
    Fluid,
    Thermal,
    Electrical,
}

impl DomainKind {
    /// Name of the potential in this domain ("Pressure", "Temperature", "Voltage").
    pub fn potential_name(self) -> &'static str {
        match self {
            DomainKind::Fluid => "Pressure",
            DomainKind::Thermal => "Temperature",
            DomainKind::Electrical => "Voltage",
        }
    }

    /// Name of the stored quantity in this domain.
    pub fn quantity_name(self) -> &'static str {
        match self {
            DomainKind::Fluid => "Volume",
            DomainKind::Thermal => "Heat",
            DomainKind::Electrical => "Charge",
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DomainKind::Fluid => "fluid",
            DomainKind::Thermal => "thermal",
            DomainKind::Electrical => "electrical",
        };
        f.write_str(s)
    }
}

/// Resistances substituted for switch and valve states.
///
/// Neither end is exact: an infinite or zero resistance would leave the
/// nodal matrix singular or badly scaled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwitchResistances {
    pub open: Real,
    pub closed: Real,
}

impl SwitchResistances {
    pub fn of<D: Domain>() -> Self {
        Self {
            open: D::OPEN_RESISTANCE,
            closed: D::CLOSED_RESISTANCE,
        }
    }
}

/// Traits record for one physical analogy.
///
/// Values inside a circuit are plain `Real`s in the domain's base units;
/// the associated `uom` quantities are used at the typed API boundary.
pub trait Domain: Copy + Clone + fmt::Debug + Default + Send + Sync + 'static {
    const KIND: DomainKind;

    /// Resistance of an open switch or reverse-biased valve.
    const OPEN_RESISTANCE: Real = 1e100;

    /// Resistance of a closed switch or forward-biased valve.
    const CLOSED_RESISTANCE: Real;

    /// Potential assumed for a reference node with no value set.
    const ZERO_POTENTIAL: Real = 0.0;

    /// Pressure, temperature or voltage.
    type Potential: Copy + fmt::Debug;
    /// Volume flow, heat rate or current.
    type Flux: Copy + fmt::Debug;
    /// Volume, heat or charge stored on a node.
    type Quantity: Copy + fmt::Debug;

    fn potential(v: Real) -> Self::Potential;
    fn potential_value(p: Self::Potential) -> Real;
    fn flux(v: Real) -> Self::Flux;
    fn flux_value(f: Self::Flux) -> Real;
    fn quantity(v: Real) -> Self::Quantity;
    fn quantity_value(q: Self::Quantity) -> Real;
}

/// Fluid analogy: mmHg, mL/s, mL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fluid;

impl Domain for Fluid {
    const KIND: DomainKind = DomainKind::Fluid;
    const CLOSED_RESISTANCE: Real = 1e-3;

    type Potential = units::Pressure;
    type Flux = units::VolumeRate;
    type Quantity = units::Volume;

    fn potential(v: Real) -> Self::Potential {
        units::mmhg(v)
    }
    fn potential_value(p: Self::Potential) -> Real {
        base::mmhg_of(p)
    }
    fn flux(v: Real) -> Self::Flux {
        units::ml_per_s(v)
    }
    fn flux_value(f: Self::Flux) -> Real {
        base::ml_per_s_of(f)
    }
    fn quantity(v: Real) -> Self::Quantity {
        units::ml(v)
    }
    fn quantity_value(q: Self::Quantity) -> Real {
        base::ml_of(q)
    }
}

/// Thermal analogy: K, W, J.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Thermal;

impl Domain for Thermal {
    const KIND: DomainKind = DomainKind::Thermal;
    const CLOSED_RESISTANCE: Real = 1e-4;

    type Potential = units::Temperature;
    type Flux = units::Power;
    type Quantity = units::Energy;

    fn potential(v: Real) -> Self::Potential {
        units::k(v)
    }
    fn potential_value(p: Self::Potential) -> Real {
        base::k_of(p)
    }
    fn flux(v: Real) -> Self::Flux {
        units::w(v)
    }
    fn flux_value(f: Self::Flux) -> Real {
        base::w_of(f)
    }
    fn quantity(v: Real) -> Self::Quantity {
        units::j(v)
    }
    fn quantity_value(q: Self::Quantity) -> Real {
        base::j_of(q)
    }
}

/// Electrical analogy: V, A, C.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Electrical;

impl Domain for Electrical {
    const KIND: DomainKind = DomainKind::Electrical;
    const CLOSED_RESISTANCE: Real = 1e-2;

    type Potential = units::Voltage;
    type Flux = units::Current;
    type Quantity = units::Charge;

    fn potential(v: Real) -> Self::Potential {
        units::volts(v)
    }
    fn potential_value(p: Self::Potential) -> Real {
        base::volts_of(p)
    }
    fn flux(v: Real) -> Self::Flux {
        units::amps(v)
    }
    fn flux_value(f: Self::Flux) -> Real {
        base::amps_of(f)
    }
    fn quantity(v: Real) -> Self::Quantity {
        units::coulombs(v)
    }
    fn quantity_value(q: Self::Quantity) -> Real {
        base::coulombs_of(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_resistances_follow_domain() {
        let fluid = SwitchResistances::of::<Fluid>();
        assert_eq!(fluid.open, 1e100);
        assert_eq!(fluid.closed, 1e-3);
        assert!(SwitchResistances::of::<Thermal>().closed < fluid.closed);
    }

    #[test]
    fn typed_round_trip() {
        let p = Fluid::potential(95.0);
        assert!((Fluid::potential_value(p) - 95.0).abs() < 1e-9);
        let q = Thermal::flux(80.0);
        assert!((Thermal::flux_value(q) - 80.0).abs() < 1e-9);
        let c = Electrical::quantity(1e-3);
        assert!((Electrical::quantity_value(c) - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn kind_display() {
        assert_eq!(DomainKind::Thermal.to_string(), "thermal");
    }
}
