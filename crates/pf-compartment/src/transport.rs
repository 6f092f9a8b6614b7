//! Donor-cell substance transport along committed link flows.

use pf_circuit::Domain;
use pf_core::Real;
use tracing::debug;

use crate::error::{CompartmentError, CompartmentResult};
use crate::graph::CompartmentGraph;
use crate::quantity::SubstanceQuantity;
use crate::substance::Phase;

impl<D: Domain> CompartmentGraph<D> {
    /// Move every active substance across links with a committed flow, then
    /// rebalance every leaf from the moved amounts.
    ///
    /// The donor is whichever end the flow leaves. The amount carried is the
    /// donor's intensive value at the start of the call (fraction for gas,
    /// concentration for liquid) times `|flow| * dt`, capped by what the
    /// donor still holds.
    pub fn transport(&mut self, dt: Real) -> CompartmentResult<()> {
        let Some(phase) = self.phase else {
            return Ok(());
        };
        if !(dt.is_finite() && dt > 0.0) {
            return Err(CompartmentError::InvalidValue {
                graph: self.name.clone(),
                compartment: String::new(),
                what: "time step",
                value: dt,
            });
        }

        let intensive = |q: &SubstanceQuantity| match phase {
            Phase::Gas => q.volume_fraction,
            Phase::Liquid => q.concentration,
        };
        let donor_values: Vec<Vec<Real>> = self
            .compartments
            .iter()
            .map(|c| c.substances.iter().map(|q| intensive(q).unwrap_or(0.0)).collect())
            .collect();

        let moves: Vec<(usize, usize, Real)> = self
            .links
            .iter()
            .flatten()
            .filter_map(|link| {
                let q = link.flow?;
                if q == 0.0 {
                    return None;
                }
                let (donor, receiver) = if q > 0.0 {
                    (link.source, link.target)
                } else {
                    (link.target, link.source)
                };
                Some((donor.slot(), receiver.slot(), q.abs() * dt))
            })
            .collect();

        if let Some(cmpt) = moves
            .iter()
            .flat_map(|&(d, r, _)| [d, r])
            .map(|slot| &self.compartments[slot])
            .find(|c| !c.is_leaf())
        {
            return Err(CompartmentError::NotLeaf {
                graph: self.name.clone(),
                compartment: cmpt.name.clone(),
            });
        }

        let mut moved_total = 0.0;
        for (donor, receiver, carried) in moves {
            for k in 0..self.compartments[donor].substances.len() {
                let wanted = donor_values[donor][k] * carried;
                if wanted <= 0.0 {
                    continue;
                }
                let held = &self.compartments[donor].substances[k];
                let available = match phase {
                    Phase::Gas => held.volume,
                    Phase::Liquid => held.mass,
                }
                .unwrap_or(0.0)
                .max(0.0);
                let amount = wanted.min(available);
                if amount <= 0.0 {
                    continue;
                }
                moved_total += amount;
                let take = &mut self.compartments[donor].substances[k];
                let left = available - amount;
                match phase {
                    Phase::Gas => take.volume = Some(left),
                    Phase::Liquid => take.mass = Some(left),
                }
                let give = &mut self.compartments[receiver].substances[k];
                match phase {
                    Phase::Gas => give.volume = Some(give.volume.unwrap_or(0.0) + amount),
                    Phase::Liquid => give.mass = Some(give.mass.unwrap_or(0.0) + amount),
                }
            }
        }

        debug!(graph = %self.name, moved = moved_total, "substance transport");
        self.balance_by_extensive()
    }
}
