//! Per-compartment record of one substance.

use pf_core::{Real, SubstanceId};

/// Amount of one substance in one compartment.
///
/// Gas records use `volume` and `volume_fraction`; liquid records use `mass`
/// and `concentration`. `None` means "not computed yet".
#[derive(Clone, Debug, PartialEq)]
pub struct SubstanceQuantity {
    pub(crate) substance: SubstanceId,
    pub(crate) volume: Option<Real>,
    pub(crate) mass: Option<Real>,
    pub(crate) concentration: Option<Real>,
    pub(crate) volume_fraction: Option<Real>,
    pub(crate) partial_pressure: Option<Real>,
}

impl SubstanceQuantity {
    pub(crate) fn new(substance: SubstanceId) -> Self {
        Self {
            substance,
            volume: None,
            mass: None,
            concentration: None,
            volume_fraction: None,
            partial_pressure: None,
        }
    }

    pub fn substance(&self) -> SubstanceId {
        self.substance
    }

    pub fn volume(&self) -> Option<Real> {
        self.volume
    }

    pub fn mass(&self) -> Option<Real> {
        self.mass
    }

    pub fn concentration(&self) -> Option<Real> {
        self.concentration
    }

    pub fn volume_fraction(&self) -> Option<Real> {
        self.volume_fraction
    }

    pub fn partial_pressure(&self) -> Option<Real> {
        self.partial_pressure
    }

    pub fn set_volume(&mut self, v: Real) {
        self.volume = Some(v);
    }

    pub fn set_mass(&mut self, m: Real) {
        self.mass = Some(m);
    }

    pub fn set_concentration(&mut self, c: Real) {
        self.concentration = Some(c);
    }

    pub fn set_volume_fraction(&mut self, f: Real) {
        self.volume_fraction = Some(f);
    }

    /// Overwrite every field at once (snapshot restore).
    pub fn restore(
        &mut self,
        volume: Option<Real>,
        mass: Option<Real>,
        concentration: Option<Real>,
        volume_fraction: Option<Real>,
        partial_pressure: Option<Real>,
    ) {
        self.volume = volume;
        self.mass = mass;
        self.concentration = concentration;
        self.volume_fraction = volume_fraction;
        self.partial_pressure = partial_pressure;
    }

    /// Zero every field that has been computed.
    pub fn set_to_zero(&mut self) {
        for field in [
            &mut self.volume,
            &mut self.mass,
            &mut self.concentration,
            &mut self.volume_fraction,
            &mut self.partial_pressure,
        ] {
            if field.is_some() {
                *field = Some(0.0);
            }
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<Real> {
        match name {
            "Volume" => self.volume,
            "Mass" => self.mass,
            "Concentration" => self.concentration,
            "VolumeFraction" => self.volume_fraction,
            "PartialPressure" => self.partial_pressure,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroing_keeps_unset_fields_unset() {
        let mut q = SubstanceQuantity::new(SubstanceId::from_index(0));
        q.set_mass(3.0);
        q.set_to_zero();
        assert_eq!(q.mass(), Some(0.0));
        assert_eq!(q.volume(), None);
        assert_eq!(q.field("Mass"), Some(0.0));
        assert_eq!(q.field("Bogus"), None);
    }
}
