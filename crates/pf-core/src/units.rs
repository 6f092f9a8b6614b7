// pf-core/src/units.rs

use uom::si::f64::{
    ElectricCharge as UomElectricCharge, ElectricCurrent as UomElectricCurrent,
    ElectricPotential as UomElectricPotential, Energy as UomEnergy, Power as UomPower,
    Pressure as UomPressure, ThermodynamicTemperature as UomThermodynamicTemperature,
    Time as UomTime, Volume as UomVolume, VolumeRate as UomVolumeRate,
};

// Public canonical unit types (SI, f64)
pub type Charge = UomElectricCharge;
pub type Current = UomElectricCurrent;
pub type Voltage = UomElectricPotential;
pub type Energy = UomEnergy;
pub type Power = UomPower;
pub type Pressure = UomPressure;
pub type Temperature = UomThermodynamicTemperature;
pub type Time = UomTime;
pub type Volume = UomVolume;
pub type VolumeRate = UomVolumeRate;

#[inline]
pub fn mmhg(v: f64) -> Pressure {
    use uom::si::pressure::millimeter_of_mercury;
    Pressure::new::<millimeter_of_mercury>(v)
}

#[inline]
pub fn ml_per_s(v: f64) -> VolumeRate {
    use uom::si::volume_rate::cubic_centimeter_per_second;
    VolumeRate::new::<cubic_centimeter_per_second>(v)
}

#[inline]
pub fn ml(v: f64) -> Volume {
    use uom::si::volume::milliliter;
    Volume::new::<milliliter>(v)
}

#[inline]
pub fn k(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::kelvin;
    Temperature::new::<kelvin>(v)
}

#[inline]
pub fn w(v: f64) -> Power {
    use uom::si::power::watt;
    Power::new::<watt>(v)
}

#[inline]
pub fn j(v: f64) -> Energy {
    use uom::si::energy::joule;
    Energy::new::<joule>(v)
}

#[inline]
pub fn volts(v: f64) -> Voltage {
    use uom::si::electric_potential::volt;
    Voltage::new::<volt>(v)
}

#[inline]
pub fn amps(v: f64) -> Current {
    use uom::si::electric_current::ampere;
    Current::new::<ampere>(v)
}

#[inline]
pub fn coulombs(v: f64) -> Charge {
    use uom::si::electric_charge::coulomb;
    Charge::new::<coulomb>(v)
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

/// Readback helpers in the base units each domain solves in.
pub mod base {
    use super::*;

    #[inline]
    pub fn mmhg_of(p: Pressure) -> f64 {
        p.get::<uom::si::pressure::millimeter_of_mercury>()
    }

    #[inline]
    pub fn ml_per_s_of(q: VolumeRate) -> f64 {
        q.get::<uom::si::volume_rate::cubic_centimeter_per_second>()
    }

    #[inline]
    pub fn ml_of(v: Volume) -> f64 {
        v.get::<uom::si::volume::milliliter>()
    }

    #[inline]
    pub fn k_of(t: Temperature) -> f64 {
        t.get::<uom::si::thermodynamic_temperature::kelvin>()
    }

    #[inline]
    pub fn w_of(p: Power) -> f64 {
        p.get::<uom::si::power::watt>()
    }

    #[inline]
    pub fn j_of(e: Energy) -> f64 {
        e.get::<uom::si::energy::joule>()
    }

    #[inline]
    pub fn volts_of(v: Voltage) -> f64 {
        v.get::<uom::si::electric_potential::volt>()
    }

    #[inline]
    pub fn amps_of(i: Current) -> f64 {
        i.get::<uom::si::electric_current::ampere>()
    }

    #[inline]
    pub fn coulombs_of(q: Charge) -> f64 {
        q.get::<uom::si::electric_charge::coulomb>()
    }

    #[inline]
    pub fn s_of(t: Time) -> f64 {
        t.get::<uom::si::time::second>()
    }
}
