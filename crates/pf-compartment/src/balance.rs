//! Recompute intensive or extensive substance values on a leaf.
//!
//! Reservoirs (infinite quantity) keep their intensive values; their
//! extensive values become infinite for every substance present.

use pf_circuit::Domain;
use pf_core::{FRACTION_TOLERANCE, Real, SubstanceId, Tolerances, ZERO_APPROX, nearly_equal};
use tracing::{error, warn};

use crate::error::{CompartmentError, CompartmentResult};
use crate::graph::CompartmentGraph;
use crate::ids::CompartmentId;
use crate::quantity::SubstanceQuantity;
use crate::substance::Phase;

const FRACTION_SUM: Tolerances = Tolerances {
    abs: FRACTION_TOLERANCE,
    rel: 0.0,
};

/// Which gas property is authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceGasBy {
    /// Substance volumes are known; derive fractions.
    Volume,
    /// Volume fractions are known; derive substance volumes.
    VolumeFraction,
}

/// Which liquid property is authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceLiquidBy {
    /// Masses are known; derive concentrations.
    Mass,
    /// Concentrations are known; derive masses.
    Concentration,
}

fn scale(fraction: Real, total: Real) -> Real {
    // INFINITY * 0 would be NaN
    if fraction == 0.0 { 0.0 } else { fraction * total }
}

impl<D: Domain> CompartmentGraph<D> {
    fn leaf_index(&self, id: CompartmentId) -> CompartmentResult<usize> {
        let cmpt = self.checked(id)?;
        if !cmpt.is_leaf() {
            return Err(CompartmentError::NotLeaf {
                graph: self.name.clone(),
                compartment: cmpt.name.clone(),
            });
        }
        Ok(id.slot())
    }

    /// Sum of the active volume fractions on a leaf.
    pub fn fraction_sum(&self, id: CompartmentId) -> CompartmentResult<Real> {
        let slot = self.leaf_index(id)?;
        Ok(self.compartments[slot]
            .substances
            .iter()
            .filter_map(SubstanceQuantity::volume_fraction)
            .sum())
    }

    /// Rebalance a gas leaf.
    ///
    /// By fraction, the fractions must sum to one within
    /// `FRACTION_TOLERANCE`; anything else is fatal. A compartment with no
    /// gas at all (all fractions zero, no volume) is accepted.
    pub fn balance_gas(&mut self, id: CompartmentId, by: BalanceGasBy) -> CompartmentResult<()> {
        let slot = self.leaf_index(id)?;
        let graph = self.name.clone();
        let cmpt = &mut self.compartments[slot];
        let volume = cmpt.quantity;
        let pressure = cmpt.potential;
        let reservoir = volume == Some(Real::INFINITY);

        match by {
            BalanceGasBy::Volume if reservoir => {
                for q in &mut cmpt.substances {
                    let f = q.volume_fraction.unwrap_or(0.0);
                    q.volume = Some(scale(f, Real::INFINITY));
                }
            }
            BalanceGasBy::Volume => {
                let total: Real = cmpt.substances.iter().filter_map(|q| q.volume).sum();
                if total <= 0.0 {
                    for q in &mut cmpt.substances {
                        q.volume = Some(0.0);
                        q.volume_fraction = Some(0.0);
                    }
                } else {
                    for q in &mut cmpt.substances {
                        let f = q.volume.unwrap_or(0.0) / total;
                        q.volume_fraction = Some(f);
                        if let Some(v) = volume {
                            q.volume = Some(f * v);
                        }
                    }
                }
            }
            BalanceGasBy::VolumeFraction => {
                let sum: Real = cmpt.substances.iter().filter_map(|q| q.volume_fraction).sum();
                let empty = sum == 0.0 && volume.is_none_or(|v| v == 0.0);
                let unbalanced = !nearly_equal(sum, 1.0, FRACTION_SUM);
                if !cmpt.substances.is_empty() && !empty && unbalanced {
                    error!(
                        graph = %graph,
                        compartment = %cmpt.name,
                        sum,
                        "volume fractions do not sum to one"
                    );
                    return Err(CompartmentError::FractionSum {
                        graph,
                        compartment: cmpt.name.clone(),
                        sum,
                    });
                }
                for q in &mut cmpt.substances {
                    let f = q.volume_fraction.unwrap_or(0.0);
                    q.volume_fraction = Some(f);
                    if let Some(v) = volume {
                        q.volume = Some(scale(f, v));
                    }
                }
            }
        }

        for q in &mut cmpt.substances {
            if let (Some(f), Some(p)) = (q.volume_fraction, pressure) {
                q.partial_pressure = Some(f * p);
            }
        }
        self.check_finite(slot, false)
    }

    /// Rebalance a liquid leaf.
    pub fn balance_liquid(
        &mut self,
        id: CompartmentId,
        by: BalanceLiquidBy,
    ) -> CompartmentResult<()> {
        let slot = self.leaf_index(id)?;
        let cmpt = &mut self.compartments[slot];
        let volume = cmpt.quantity;
        let reservoir = volume == Some(Real::INFINITY);

        for q in &mut cmpt.substances {
            match by {
                _ if reservoir => {
                    let c = q.concentration.unwrap_or(0.0);
                    q.mass = Some(scale(c, Real::INFINITY));
                }
                BalanceLiquidBy::Mass => {
                    let m = q.mass.unwrap_or(0.0);
                    match volume {
                        Some(v) if v > ZERO_APPROX => q.concentration = Some(m / v),
                        _ => {
                            if m > ZERO_APPROX {
                                warn!(
                                    compartment = %cmpt.name,
                                    mass = m,
                                    "mass in an empty compartment"
                                );
                            }
                            q.concentration = Some(0.0);
                        }
                    }
                }
                BalanceLiquidBy::Concentration => {
                    if let Some(v) = volume {
                        q.mass = Some(q.concentration.unwrap_or(0.0) * v);
                    }
                }
            }
        }
        self.check_finite(slot, true)
    }

    /// Set several volume fractions on a gas leaf and rebalance by fraction.
    ///
    /// The sum is validated before anything is written, so a rejected
    /// mixture leaves the compartment as it was.
    pub fn set_volume_fractions(
        &mut self,
        id: CompartmentId,
        fractions: &[(SubstanceId, Real)],
    ) -> CompartmentResult<()> {
        let slot = self.leaf_index(id)?;
        let graph = self.name.clone();
        let cmpt = &self.compartments[slot];
        let mut sum = 0.0;
        for q in &cmpt.substances {
            let f = fractions
                .iter()
                .find(|(s, _)| *s == q.substance)
                .map(|&(_, f)| f)
                .or(q.volume_fraction)
                .unwrap_or(0.0);
            if !(0.0..=1.0).contains(&f) {
                return Err(CompartmentError::InvalidValue {
                    graph,
                    compartment: cmpt.name.clone(),
                    what: "volume fraction",
                    value: f,
                });
            }
            sum += f;
        }
        if let Some((missing, _)) = fractions.iter().find(|(s, _)| cmpt.substance(*s).is_none()) {
            return Err(CompartmentError::InactiveSubstance {
                graph,
                substance: missing.to_string(),
            });
        }
        if !nearly_equal(sum, 1.0, FRACTION_SUM) {
            error!(graph = %graph, compartment = %cmpt.name, sum, "rejected gas mixture");
            return Err(CompartmentError::FractionSum {
                graph,
                compartment: cmpt.name.clone(),
                sum,
            });
        }

        let cmpt = &mut self.compartments[slot];
        for &(s, f) in fractions {
            if let Some(q) = cmpt.substance_mut(s) {
                q.volume_fraction = Some(f);
            }
        }
        self.balance_gas(id, BalanceGasBy::VolumeFraction)
    }

    /// Normalize every leaf's intensive values and rebalance from them.
    ///
    /// Gas fractions are rescaled to sum to one (all-zero stays zero);
    /// liquids are rebalanced by concentration.
    pub fn balance_by_intensive(&mut self) -> CompartmentResult<()> {
        let Some(phase) = self.phase else {
            return Ok(());
        };
        let leaves: Vec<CompartmentId> = self
            .compartments
            .iter()
            .filter(|c| c.is_leaf())
            .map(|c| c.id)
            .collect();
        for id in leaves {
            match phase {
                Phase::Gas => {
                    let cmpt = &mut self.compartments[id.slot()];
                    let sum: Real = cmpt.substances.iter().filter_map(|q| q.volume_fraction).sum();
                    if sum == 0.0 {
                        cmpt.substances.iter_mut().for_each(SubstanceQuantity::set_to_zero);
                        continue;
                    }
                    if (1.0 - sum).abs() > ZERO_APPROX / 10.0 {
                        for q in &mut cmpt.substances {
                            if let Some(f) = q.volume_fraction {
                                q.volume_fraction = Some(f / sum);
                            }
                        }
                    }
                    self.balance_gas(id, BalanceGasBy::VolumeFraction)?;
                }
                Phase::Liquid => self.balance_liquid(id, BalanceLiquidBy::Concentration)?,
            }
        }
        Ok(())
    }

    /// Rebalance every leaf from its extensive values (after transport).
    pub(crate) fn balance_by_extensive(&mut self) -> CompartmentResult<()> {
        let Some(phase) = self.phase else {
            return Ok(());
        };
        let leaves: Vec<CompartmentId> = self
            .compartments
            .iter()
            .filter(|c| c.is_leaf())
            .map(|c| c.id)
            .collect();
        for id in leaves {
            match phase {
                Phase::Gas => self.balance_gas(id, BalanceGasBy::Volume)?,
                Phase::Liquid => self.balance_liquid(id, BalanceLiquidBy::Mass)?,
            }
        }
        Ok(())
    }

    /// Extensive values may be infinite on reservoirs; nothing may be NaN,
    /// and intensive values must be finite.
    fn check_finite(&self, slot: usize, liquid: bool) -> CompartmentResult<()> {
        let cmpt = &self.compartments[slot];
        for q in &cmpt.substances {
            let (extensive, intensive) = if liquid {
                (q.mass, q.concentration)
            } else {
                (q.volume, q.volume_fraction)
            };
            let bad_extensive = extensive.is_some_and(Real::is_nan);
            let bad_intensive = intensive.is_some_and(|v| !v.is_finite());
            if bad_extensive || bad_intensive {
                return Err(CompartmentError::NonFinite {
                    graph: self.name.clone(),
                    compartment: cmpt.name.clone(),
                    what: format!("substance {}", q.substance),
                });
            }
        }
        Ok(())
    }
}
