//! Spontaneous breathing driven by a pleural pressure source.
//!
//! Fluid circuit `Respiratory`: `Ambient` (reference, atmospheric) feeds
//! `Mouth` and `Alveoli` through the upper and lower airways; the alveoli
//! store volume on a compliance against `Pleural`, whose pressure the
//! `Driver` source lowers once per breath.
//!
//! Gas moves between the ambient reservoir and the lungs over the shared
//! `Respiratory` gas graph, which must already hold the `Environment`
//! compartment (the environment system creates it).

use std::f64::consts::TAU;

use pf_circuit::Fluid;
use pf_core::{NodeId, PathId, Real, SubstanceId, ensure_finite};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ENVIRONMENT_COMPARTMENT, RESPIRATORY_GRAPH, missing};
use crate::cache::GenerationCache;
use crate::data::EngineData;
use crate::error::{SimError, SimResult};
use crate::system::PhysiologySystem;

pub const CIRCUIT: &str = "Respiratory";

/// Lower airway resistance at full obstruction, as a multiple of normal.
const OBSTRUCTION_GAIN: Real = 20.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RespirationSettings {
    /// Peak drop in pleural pressure over a breath (mmHg).
    pub driver_amplitude_mmhg: Real,
    pub breath_period_s: Real,
    pub upper_airway_resistance_mmhg_s_per_ml: Real,
    pub lower_airway_resistance_mmhg_s_per_ml: Real,
    pub compliance_ml_per_mmhg: Real,
    /// Alveolar volume at the end of a relaxed expiration.
    pub functional_residual_volume_ml: Real,
    pub dead_space_ml: Real,
}

impl Default for RespirationSettings {
    fn default() -> Self {
        Self {
            driver_amplitude_mmhg: 5.0,
            breath_period_s: 5.0,
            upper_airway_resistance_mmhg_s_per_ml: 0.0005,
            lower_airway_resistance_mmhg_s_per_ml: 0.0006,
            compliance_ml_per_mmhg: 100.0,
            functional_residual_volume_ml: 2300.0,
            dead_space_ml: 150.0,
        }
    }
}

impl RespirationSettings {
    fn validate(&self) -> SimResult<()> {
        let positive = [
            ("breath_period_s", self.breath_period_s),
            ("upper_airway_resistance", self.upper_airway_resistance_mmhg_s_per_ml),
            ("lower_airway_resistance", self.lower_airway_resistance_mmhg_s_per_ml),
            ("compliance", self.compliance_ml_per_mmhg),
            ("functional_residual_volume", self.functional_residual_volume_ml),
            ("dead_space", self.dead_space_ml),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidConfig {
                    what: format!("respiration {name} must be positive, got {value}"),
                });
            }
        }
        Ok(())
    }

    /// Pleural pressure relative to ambient at time `t_s`.
    pub fn driver_pressure(&self, t_s: Real) -> Real {
        -self.driver_amplitude_mmhg * (1.0 - (TAU * t_s / self.breath_period_s).cos()) / 2.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Elements {
    ambient: NodeId,
    alveoli: NodeId,
    pleural: NodeId,
    upper_airway: PathId,
    lower_airway: PathId,
    driver: PathId,
}

#[derive(Debug, Clone, Copy, Default)]
struct BreathReport {
    alveolar_volume_ml: Option<Real>,
    airway_flow_ml_per_s: Option<Real>,
    alveolar_pressure_mmhg: Option<Real>,
    pleural_pressure_mmhg: Option<Real>,
}

pub struct RespirationSystem {
    settings: RespirationSettings,
    lower_airway_resistance: GenerationCache<Real>,
    elements: Option<Elements>,
    report: BreathReport,
}

impl Default for RespirationSystem {
    fn default() -> Self {
        Self::new(RespirationSettings::default())
    }
}

impl RespirationSystem {
    pub fn new(settings: RespirationSettings) -> Self {
        Self {
            settings,
            lower_airway_resistance: GenerationCache::new(),
            elements: None,
            report: BreathReport::default(),
        }
    }

    pub fn settings(&self) -> &RespirationSettings {
        &self.settings
    }

    fn elements(&self) -> SimResult<Elements> {
        self.elements.ok_or(SimError::NotInitialized)
    }

    /// Committed pressure of the ambient reservoir.
    fn ambient_pressure(data: &EngineData) -> SimResult<Real> {
        let graph = data
            .graph::<Fluid>(RESPIRATORY_GRAPH)
            .ok_or_else(|| missing(format!("gas graph '{RESPIRATORY_GRAPH}'")))?;
        let env = graph
            .compartment_by_name(ENVIRONMENT_COMPARTMENT)
            .ok_or_else(|| missing(format!("compartment '{ENVIRONMENT_COMPARTMENT}'")))?;
        graph
            .potential(env)
            .ok_or_else(|| missing("ambient pressure"))
    }

    fn build_circuit(&mut self, data: &mut EngineData, ambient_mmhg: Real) -> SimResult<()> {
        let s = &self.settings;
        let mut b = data.circuit_builder::<Fluid>(CIRCUIT);
        let ambient = b.add_reference_node("Ambient", Some(ambient_mmhg));
        let mouth = b.add_node("Mouth");
        b.set_node_potential(mouth, ambient_mmhg);
        let alveoli = b.add_node("Alveoli");
        b.set_node_potential(alveoli, ambient_mmhg);
        b.set_node_quantity(alveoli, s.functional_residual_volume_ml);
        let pleural = b.add_node("Pleural");
        b.set_node_potential(pleural, ambient_mmhg);

        let upper_airway = b.add_resistor(
            "UpperAirway",
            ambient,
            mouth,
            s.upper_airway_resistance_mmhg_s_per_ml,
        );
        let lower_airway = b.add_resistor(
            "LowerAirway",
            mouth,
            alveoli,
            s.lower_airway_resistance_mmhg_s_per_ml,
        );
        b.add_capacitor("Compliance", alveoli, pleural, s.compliance_ml_per_mmhg);
        let driver = b.add_potential_source("Driver", ambient, pleural, 0.0);
        data.add_circuit(b.build()?)?;

        self.elements = Some(Elements {
            ambient,
            alveoli,
            pleural,
            upper_airway,
            lower_airway,
            driver,
        });
        Ok(())
    }

    /// Lay the lungs into the shared gas graph and start them with the
    /// ambient mixture.
    fn build_lungs(&self, data: &mut EngineData, ambient_mmhg: Real) -> SimResult<()> {
        let e = self.elements()?;
        let circuit = data
            .circuit::<Fluid>(CIRCUIT)
            .ok_or_else(|| missing(format!("circuit '{CIRCUIT}'")))?;
        let mouth_node = circuit
            .node_by_name("Mouth")
            .ok_or_else(|| missing("Mouth node"))?;

        let graph = data
            .graph_mut::<Fluid>(RESPIRATORY_GRAPH)
            .ok_or_else(|| missing(format!("gas graph '{RESPIRATORY_GRAPH}'")))?;
        let env = graph
            .compartment_by_name(ENVIRONMENT_COMPARTMENT)
            .ok_or_else(|| missing(format!("compartment '{ENVIRONMENT_COMPARTMENT}'")))?;
        let lungs = graph.add_compartment("Lungs")?;
        let mouth = graph.add_compartment("Mouth")?;
        let alveoli = graph.add_compartment("Alveoli")?;
        graph.add_child(lungs, mouth)?;
        graph.add_child(lungs, alveoli)?;
        graph.map_node(env, e.ambient)?;
        graph.map_node(mouth, mouth_node)?;
        graph.map_node(alveoli, e.alveoli)?;

        let inflow = graph.add_link("EnvironmentToMouth", env, mouth)?;
        graph.bind_path(inflow, e.upper_airway)?;
        let deep = graph.add_link("MouthToAlveoli", mouth, alveoli)?;
        graph.bind_path(deep, e.lower_airway)?;

        let fractions: Vec<(SubstanceId, Real)> = graph
            .active_substances()
            .iter()
            .map(|&s| {
                let f = graph
                    .compartment(env)
                    .and_then(|c| c.substance(s))
                    .and_then(|q| q.volume_fraction())
                    .unwrap_or(0.0);
                (s, f)
            })
            .collect();
        for (leaf, volume) in [
            (mouth, self.settings.dead_space_ml),
            (alveoli, self.settings.functional_residual_volume_ml),
        ] {
            graph.set_quantity(leaf, volume)?;
            graph.set_potential(leaf, ambient_mmhg)?;
            graph.set_volume_fractions(leaf, &fractions)?;
        }
        data.bind_graph::<Fluid>(RESPIRATORY_GRAPH, CIRCUIT)
    }
}

impl PhysiologySystem for RespirationSystem {
    fn name(&self) -> &str {
        "Respiration"
    }

    fn initialize(&mut self, data: &mut EngineData) -> SimResult<()> {
        self.settings.validate()?;
        let ambient_mmhg = Self::ambient_pressure(data)?;
        self.build_circuit(data, ambient_mmhg)?;
        self.build_lungs(data, ambient_mmhg)?;
        self.lower_airway_resistance.invalidate();
        debug!(ambient_mmhg, "respiration initialized");
        Ok(())
    }

    fn pre_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let e = self.elements()?;
        let ambient_mmhg = Self::ambient_pressure(data)?;
        let t_next = data.time_s() + data.dt_s();
        let rise = ensure_finite(self.settings.driver_pressure(t_next), "driver pressure")?;

        let base = self.settings.lower_airway_resistance_mmhg_s_per_ml;
        let severity = data.conditions.airway_obstruction().unwrap_or(0.0);
        let lower = *self
            .lower_airway_resistance
            .get_or_try_update(data.state_generation(), || {
                Ok::<_, SimError>(base * (1.0 + OBSTRUCTION_GAIN * severity))
            })?;

        let circuit = data
            .circuit_mut::<Fluid>(CIRCUIT)
            .ok_or_else(|| missing(format!("circuit '{CIRCUIT}'")))?;
        circuit.set_next_potential(e.ambient, ambient_mmhg)?;
        circuit.set_next_value(e.driver, rise)?;
        circuit.set_next_value(e.lower_airway, lower)?;
        Ok(())
    }

    fn post_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let e = self.elements()?;
        let circuit = data
            .circuit::<Fluid>(CIRCUIT)
            .ok_or_else(|| missing(format!("circuit '{CIRCUIT}'")))?;
        let alveoli = circuit.node(e.alveoli);
        self.report = BreathReport {
            alveolar_volume_ml: alveoli.and_then(|n| n.quantity()),
            airway_flow_ml_per_s: circuit.path(e.upper_airway).and_then(|p| p.flow()),
            alveolar_pressure_mmhg: alveoli.and_then(|n| n.potential()),
            pleural_pressure_mmhg: circuit.node(e.pleural).and_then(|n| n.potential()),
        };
        Ok(())
    }

    fn get_scalar(&self, key: &str) -> Option<Real> {
        let r = &self.report;
        match key {
            "LungVolume" => Some(r.alveolar_volume_ml? + self.settings.dead_space_ml),
            "AlveolarVolume" => r.alveolar_volume_ml,
            "AirwayFlow" => r.airway_flow_ml_per_s,
            "AlveolarPressure" => r.alveolar_pressure_mmhg,
            "PleuralPressure" => r.pleural_pressure_mmhg,
            "RespirationRate" => Some(60.0 / self.settings.breath_period_s),
            "LowerAirwayResistance" => self.lower_airway_resistance.get().copied(),
            _ => None,
        }
    }
}
