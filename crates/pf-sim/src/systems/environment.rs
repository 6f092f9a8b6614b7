//! Surroundings: heat exchange between the body and its environment, and
//! the ambient gas mixture.
//!
//! Thermal circuit `Environment`: metabolic heat enters `Core`, which
//! stores it, and leaves through `Skin` and `Clothing` to the `Ambient`
//! reference. Active heating or cooling is a flow source on the skin; an
//! applied temperature is a source switched onto the skin.

use pf_circuit::{Fluid, SwitchState, Thermal};
use pf_compartment::{CompartmentGraph, Phase};
use pf_core::{NodeId, PathId, Real, clamp_reported};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ENVIRONMENT_COMPARTMENT, RESPIRATORY_GRAPH, missing};
use crate::actions::{Action, EnvironmentConditions, ThermalApplication};
use crate::cache::GenerationCache;
use crate::data::EngineData;
use crate::error::{SimError, SimResult};
use crate::system::PhysiologySystem;

pub const CIRCUIT: &str = "Environment";
pub const THERMAL_GRAPH: &str = "Thermal";

/// Body constants used by the heat-exchange circuit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub skin_area_m2: Real,
    pub metabolic_power_w: Real,
    pub core_heat_capacity_j_per_k: Real,
    pub core_to_skin_resistance_k_per_w: Real,
    pub core_temperature_k: Real,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            skin_area_m2: 1.8,
            metabolic_power_w: 100.0,
            core_heat_capacity_j_per_k: 245_000.0,
            core_to_skin_resistance_k_per_w: 0.05,
            core_temperature_k: 310.15,
        }
    }
}

/// Values derived from the conditions and the current thermal application.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    clothing_resistance: Real,
    convective_resistance: Real,
    active_power_w: Real,
    applied_temperature_k: Option<Real>,
}

#[derive(Debug, Clone, Copy)]
struct Elements {
    core: NodeId,
    skin: NodeId,
    ambient: NodeId,
    metabolism: PathId,
    skin_to_clothing: PathId,
    clothing_to_environment: PathId,
    active_heat: PathId,
    active_temperature: PathId,
    active_switch: PathId,
}

#[derive(Debug, Clone, Copy, Default)]
struct HeatReport {
    skin_heat_loss_w: Option<Real>,
    convective_heat_loss_w: Option<Real>,
    active_heat_transfer_w: Option<Real>,
    core_temperature_k: Option<Real>,
    skin_temperature_k: Option<Real>,
}

impl HeatReport {
    fn total_heat_loss_w(&self) -> Option<Real> {
        Some(self.convective_heat_loss_w? - self.active_heat_transfer_w.unwrap_or(0.0))
    }
}

/// What an `EnvironmentSystem` keeps across a snapshot.
#[derive(Serialize, Deserialize)]
struct SavedEnvironment {
    conditions: EnvironmentConditions,
    application: ThermalApplication,
}

pub struct EnvironmentSystem {
    settings: EnvironmentSettings,
    conditions: EnvironmentConditions,
    application: ThermalApplication,
    coefficients: GenerationCache<Coefficients>,
    elements: Option<Elements>,
    report: HeatReport,
}

impl Default for EnvironmentSystem {
    fn default() -> Self {
        Self::new(EnvironmentSettings::default())
    }
}

impl EnvironmentSystem {
    pub fn new(settings: EnvironmentSettings) -> Self {
        Self {
            settings,
            conditions: EnvironmentConditions::default(),
            application: ThermalApplication::default(),
            coefficients: GenerationCache::new(),
            elements: None,
            report: HeatReport::default(),
        }
    }

    pub fn conditions(&self) -> &EnvironmentConditions {
        &self.conditions
    }

    pub fn application(&self) -> &ThermalApplication {
        &self.application
    }

    fn elements(&self) -> SimResult<Elements> {
        self.elements.ok_or(SimError::NotInitialized)
    }

    fn build_circuit(&mut self, data: &mut EngineData) -> SimResult<()> {
        let s = &self.settings;
        let mut b = data.circuit_builder::<Thermal>(CIRCUIT);
        let ground = b.add_reference_node("Ground", Some(0.0));
        let core = b.add_node("Core");
        b.set_node_potential(core, s.core_temperature_k);
        b.set_node_quantity(core, s.core_heat_capacity_j_per_k * s.core_temperature_k);
        let skin = b.add_node("Skin");
        let clothing = b.add_node("Clothing");
        let ambient = b.add_reference_node("Ambient", Some(self.conditions.ambient_temperature_k));
        let active = b.add_node("Active");

        let metabolism = b.add_flow_source("Metabolism", ground, core, s.metabolic_power_w);
        b.add_capacitor("CoreStorage", core, ground, s.core_heat_capacity_j_per_k);
        let core_to_skin =
            b.add_resistor("CoreToSkin", core, skin, s.core_to_skin_resistance_k_per_w);
        let skin_to_clothing = b.add_resistor("SkinToClothing", skin, clothing, 1.0);
        let clothing_to_environment =
            b.add_resistor("ClothingToEnvironment", clothing, ambient, 1.0);
        let active_heat = b.add_flow_source("ActiveHeat", ground, skin, 0.0);
        let active_temperature = b.add_potential_source(
            "ActiveTemperature",
            ground,
            active,
            self.conditions.ambient_temperature_k,
        );
        let active_switch = b.add_switch("ActiveSwitch", active, skin, SwitchState::Open);
        data.add_circuit(b.build()?)?;

        let mut graph = CompartmentGraph::<Thermal>::new(THERMAL_GRAPH);
        let body = graph.add_compartment("Body")?;
        let core_cmpt = graph.add_compartment("Core")?;
        let skin_cmpt = graph.add_compartment("Skin")?;
        graph.add_child(body, core_cmpt)?;
        graph.add_child(body, skin_cmpt)?;
        graph.map_node(core_cmpt, core)?;
        graph.map_node(skin_cmpt, skin)?;
        let conduction = graph.add_link("CoreToSkin", core_cmpt, skin_cmpt)?;
        graph.bind_path(conduction, core_to_skin)?;
        data.add_graph(graph, Some(CIRCUIT))?;

        self.elements = Some(Elements {
            core,
            skin,
            ambient,
            metabolism,
            skin_to_clothing,
            clothing_to_environment,
            active_heat,
            active_temperature,
            active_switch,
        });
        Ok(())
    }

    /// Create the shared gas graph with its ambient reservoir if no other
    /// system has.
    fn ensure_gas_graph(data: &mut EngineData) -> SimResult<()> {
        if data.graph::<Fluid>(RESPIRATORY_GRAPH).is_some() {
            return Ok(());
        }
        let mut graph = CompartmentGraph::gas(RESPIRATORY_GRAPH);
        graph.add_compartment(ENVIRONMENT_COMPARTMENT)?;
        data.add_graph(graph, None)
    }

    /// Write the ambient mixture into the reservoir compartment. Active
    /// gases missing from the mixture are set to zero; a mixture that does
    /// not sum to one is fatal.
    fn apply_gas_mixture(&self, data: &mut EngineData) -> SimResult<()> {
        let mut fractions = Vec::with_capacity(self.conditions.ambient_gases.len());
        for gas in &self.conditions.ambient_gases {
            let id = data.activate_substance(&gas.substance, Phase::Gas)?;
            fractions.push((id, gas.fraction));
        }
        let graph = data
            .graph_mut::<Fluid>(RESPIRATORY_GRAPH)
            .ok_or_else(|| missing(format!("gas graph '{RESPIRATORY_GRAPH}'")))?;
        for &id in graph.active_substances() {
            if !fractions.iter().any(|(s, _)| *s == id) {
                fractions.push((id, 0.0));
            }
        }
        let env = graph
            .compartment_by_name(ENVIRONMENT_COMPARTMENT)
            .ok_or_else(|| missing(format!("compartment '{ENVIRONMENT_COMPARTMENT}'")))?;
        graph.set_quantity(env, Real::INFINITY)?;
        graph.set_potential(env, self.conditions.atmospheric_pressure_mmhg)?;
        graph.set_volume_fractions(env, &fractions)?;
        debug!(gases = fractions.len(), "ambient gas mixture applied");
        Ok(())
    }
}

/// Fraction of the skin an effect covers.
///
/// An absolute area and a fraction may both be given; the larger wins.
/// Neither means the whole skin. Anything above one is clamped.
fn area_fraction(
    skin_area_m2: Real,
    area_m2: Option<Real>,
    fraction: Option<Real>,
    what: &'static str,
) -> SimResult<Real> {
    let from_area = area_m2.map(|a| a / skin_area_m2);
    let requested = match (from_area, fraction) {
        (Some(a), Some(f)) => {
            warn!(effect = what, "both surface area and fraction given, using the larger");
            a.max(f)
        }
        (Some(a), None) => a,
        (None, Some(f)) => f,
        (None, None) => {
            warn!(effect = what, "no surface area given, applying to the whole skin");
            1.0
        }
    };
    if !requested.is_finite() || requested < 0.0 {
        return Err(SimError::InvalidAction {
            what: format!("{what} surface area fraction {requested}"),
        });
    }
    let (clamped, changed) = clamp_reported(requested, 0.0, 1.0);
    if changed {
        warn!(effect = what, requested, "surface area fraction above 1, clamped");
    }
    Ok(clamped)
}

fn compute_coefficients(
    settings: &EnvironmentSettings,
    conditions: &EnvironmentConditions,
    application: &ThermalApplication,
    closed_resistance: Real,
) -> SimResult<Coefficients> {
    let area = settings.skin_area_m2;
    let h = conditions.convective_coefficient_w_per_m2_k;
    if !(h.is_finite() && h > 0.0) || conditions.clothing_resistance_rsi < 0.0 {
        return Err(SimError::InvalidAction {
            what: format!(
                "environment needs a positive convective coefficient and non-negative \
                 clothing resistance, got {h} and {}",
                conditions.clothing_resistance_rsi
            ),
        });
    }

    let mut active_power_w = 0.0;
    if let Some(heating) = &application.active_heating {
        let f = area_fraction(
            area,
            heating.surface_area_m2,
            heating.surface_area_fraction,
            "heating",
        )?;
        active_power_w += heating.power_w * f;
    }
    if let Some(cooling) = &application.active_cooling {
        let f = area_fraction(
            area,
            cooling.surface_area_m2,
            cooling.surface_area_fraction,
            "cooling",
        )?;
        active_power_w -= cooling.power_w * f;
    }
    let applied_temperature_k = match &application.applied_temperature {
        Some(applied) => {
            let f = area_fraction(
                area,
                applied.surface_area_m2,
                applied.surface_area_fraction,
                "applied temperature",
            )?;
            Some(applied.temperature_k * f + conditions.ambient_temperature_k * (1.0 - f))
        }
        None => None,
    };

    Ok(Coefficients {
        clothing_resistance: (conditions.clothing_resistance_rsi / area).max(closed_resistance),
        convective_resistance: 1.0 / (h * area),
        active_power_w,
        applied_temperature_k,
    })
}

impl PhysiologySystem for EnvironmentSystem {
    fn name(&self) -> &str {
        "Environment"
    }

    fn initialize(&mut self, data: &mut EngineData) -> SimResult<()> {
        if let Some(initial) = data.conditions.initial_environment() {
            self.conditions = initial.clone();
        }
        if !(self.settings.skin_area_m2.is_finite() && self.settings.skin_area_m2 > 0.0) {
            return Err(SimError::InvalidConfig {
                what: format!("skin area {} m^2", self.settings.skin_area_m2),
            });
        }
        self.build_circuit(data)?;
        Self::ensure_gas_graph(data)?;
        self.apply_gas_mixture(data)?;
        self.coefficients.invalidate();
        Ok(())
    }

    fn handles(&self, action: &Action) -> bool {
        matches!(
            action,
            Action::ThermalApplication(_) | Action::EnvironmentChange(_)
        )
    }

    fn on_action(&mut self, action: &Action, data: &mut EngineData) -> SimResult<()> {
        match action {
            Action::ThermalApplication(application) => {
                self.application = application.clone();
            }
            Action::EnvironmentChange(conditions) => {
                self.conditions = conditions.clone();
            }
            Action::Stimulus(_) => return Ok(()),
        }
        data.state_change();
        Ok(())
    }

    fn pre_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let e = self.elements()?;
        let generation = data.state_generation();
        if self.coefficients.is_stale(generation) {
            self.apply_gas_mixture(data)?;
        }

        let closed = data.config.switch_resistances::<Thermal>().closed;
        let Self {
            settings,
            conditions,
            application,
            coefficients,
            ..
        } = self;
        let c = *coefficients.get_or_try_update(generation, || {
            compute_coefficients(settings, conditions, application, closed)
        })?;

        let circuit = data
            .circuit_mut::<Thermal>(CIRCUIT)
            .ok_or_else(|| missing(format!("circuit '{CIRCUIT}'")))?;
        circuit.set_next_potential(e.ambient, conditions.ambient_temperature_k)?;
        circuit.set_next_value(e.metabolism, settings.metabolic_power_w)?;
        circuit.set_next_value(e.skin_to_clothing, c.clothing_resistance)?;
        circuit.set_next_value(e.clothing_to_environment, c.convective_resistance)?;
        circuit.set_next_value(e.active_heat, c.active_power_w)?;
        circuit.set_next_value(
            e.active_temperature,
            c.applied_temperature_k.unwrap_or(conditions.ambient_temperature_k),
        )?;
        let switch = if c.applied_temperature_k.is_some() {
            SwitchState::Closed
        } else {
            SwitchState::Open
        };
        circuit.set_next_switch(e.active_switch, switch)?;
        Ok(())
    }

    fn post_process(&mut self, data: &mut EngineData) -> SimResult<()> {
        let e = self.elements()?;
        let circuit = data
            .circuit::<Thermal>(CIRCUIT)
            .ok_or_else(|| missing(format!("circuit '{CIRCUIT}'")))?;
        let flow = |p: PathId| circuit.path(p).and_then(|p| p.flow());
        let potential = |n: NodeId| circuit.node(n).and_then(|n| n.potential());

        let applied = if self.application.applied_temperature.is_some() {
            flow(e.active_switch).unwrap_or(0.0)
        } else {
            0.0
        };
        self.report = HeatReport {
            skin_heat_loss_w: flow(e.skin_to_clothing),
            convective_heat_loss_w: flow(e.clothing_to_environment),
            active_heat_transfer_w: flow(e.active_heat).map(|q| q + applied),
            core_temperature_k: potential(e.core),
            skin_temperature_k: potential(e.skin),
        };
        Ok(())
    }

    fn save_state(&self) -> SimResult<Option<serde_json::Value>> {
        let saved = SavedEnvironment {
            conditions: self.conditions.clone(),
            application: self.application.clone(),
        };
        Ok(Some(serde_json::to_value(saved)?))
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> SimResult<()> {
        let saved: SavedEnvironment = serde_json::from_value(state.clone())?;
        self.conditions = saved.conditions;
        self.application = saved.application;
        self.coefficients.invalidate();
        Ok(())
    }

    fn get_scalar(&self, key: &str) -> Option<Real> {
        match key {
            "SkinHeatLoss" => self.report.skin_heat_loss_w,
            "ConvectiveHeatLoss" => self.report.convective_heat_loss_w,
            "ActiveHeatTransfer" => self.report.active_heat_transfer_w,
            "TotalHeatLoss" => self.report.total_heat_loss_w(),
            "ClothingResistance" => self.coefficients.get().map(|c| c.clothing_resistance),
            "AmbientTemperature" => Some(self.conditions.ambient_temperature_k),
            "AtmosphericPressure" => Some(self.conditions.atmospheric_pressure_mmhg),
            "CoreTemperature" => self.report.core_temperature_k,
            "SkinTemperature" => self.report.skin_temperature_k,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{AppliedTemperature, ThermalEffect};

    #[test]
    fn larger_area_wins_and_is_clamped() {
        assert_eq!(area_fraction(2.0, Some(1.0), Some(0.2), "heating").unwrap(), 0.5);
        assert_eq!(area_fraction(2.0, None, None, "heating").unwrap(), 1.0);
        assert_eq!(area_fraction(2.0, None, Some(1.7), "heating").unwrap(), 1.0);
        assert!(area_fraction(2.0, Some(-1.0), None, "heating").is_err());
    }

    #[test]
    fn clothing_resistance_has_a_floor() {
        let settings = EnvironmentSettings::default();
        let conditions = EnvironmentConditions {
            clothing_resistance_rsi: 0.0,
            ..EnvironmentConditions::default()
        };
        let c = compute_coefficients(&settings, &conditions, &ThermalApplication::default(), 1e-4)
            .unwrap();
        assert_eq!(c.clothing_resistance, 1e-4);
        assert!((c.convective_resistance - 1.0 / (4.0 * 1.8)).abs() < 1e-12);
        assert_eq!(c.applied_temperature_k, None);
    }

    #[test]
    fn heating_cooling_and_applied_temperature_combine() {
        let settings = EnvironmentSettings {
            skin_area_m2: 2.0,
            ..EnvironmentSettings::default()
        };
        let conditions = EnvironmentConditions::default();
        let application = ThermalApplication {
            active_heating: Some(ThermalEffect {
                power_w: 100.0,
                surface_area_m2: Some(1.0),
                surface_area_fraction: None,
            }),
            active_cooling: Some(ThermalEffect {
                power_w: 20.0,
                surface_area_m2: None,
                surface_area_fraction: Some(0.25),
            }),
            applied_temperature: Some(AppliedTemperature {
                temperature_k: 315.15,
                surface_area_m2: None,
                surface_area_fraction: Some(0.5),
            }),
        };
        let c = compute_coefficients(&settings, &conditions, &application, 1e-4).unwrap();
        assert!((c.active_power_w - 45.0).abs() < 1e-12);
        let expected = 0.5 * 315.15 + 0.5 * conditions.ambient_temperature_k;
        assert!((c.applied_temperature_k.unwrap() - expected).abs() < 1e-9);
    }
}
