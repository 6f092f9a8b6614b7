//! Actions (applied before the next step) and conditions (set before
//! initialization).

use pf_circuit::SwitchState;
use pf_core::Real;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SwitchCommand {
    Open,
    Closed,
}

impl From<SwitchCommand> for SwitchState {
    fn from(cmd: SwitchCommand) -> Self {
        match cmd {
            SwitchCommand::Open => SwitchState::Open,
            SwitchCommand::Closed => SwitchState::Closed,
        }
    }
}

/// A value staged directly onto a named circuit element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Stimulus {
    /// Resistance, capacitance or source value of a path.
    PathValue {
        circuit: String,
        path: String,
        value: Real,
    },
    Switch {
        circuit: String,
        path: String,
        state: SwitchCommand,
    },
    /// Imposed potential of a reference node.
    NodePotential {
        circuit: String,
        node: String,
        value: Real,
    },
}

impl Stimulus {
    pub fn circuit(&self) -> &str {
        match self {
            Stimulus::PathValue { circuit, .. }
            | Stimulus::Switch { circuit, .. }
            | Stimulus::NodePotential { circuit, .. } => circuit,
        }
    }
}

/// Heat added or removed over part of the skin.
///
/// When both `surface_area_m2` and `surface_area_fraction` are given the
/// larger fraction wins; when neither is, the whole skin is covered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThermalEffect {
    pub power_w: Real,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_area_m2: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_area_fraction: Option<Real>,
}

/// A temperature held against part of the skin.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppliedTemperature {
    pub temperature_k: Real,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_area_m2: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_area_fraction: Option<Real>,
}

/// Active heating, cooling and applied temperature. All three may be
/// combined; an application with none of them removes the previous one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThermalApplication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_heating: Option<ThermalEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_cooling: Option<ThermalEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_temperature: Option<AppliedTemperature>,
}

impl ThermalApplication {
    pub fn is_empty(&self) -> bool {
        self.active_heating.is_none()
            && self.active_cooling.is_none()
            && self.applied_temperature.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasFraction {
    pub substance: String,
    pub fraction: Real,
}

/// Surroundings of the patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentConditions {
    pub ambient_temperature_k: Real,
    pub atmospheric_pressure_mmhg: Real,
    /// Clothing insulation (m^2 K / W).
    pub clothing_resistance_rsi: Real,
    /// Convective film coefficient (W / m^2 K).
    pub convective_coefficient_w_per_m2_k: Real,
    pub ambient_gases: Vec<GasFraction>,
}

impl Default for EnvironmentConditions {
    fn default() -> Self {
        let gas = |name: &str, fraction| GasFraction {
            substance: name.to_string(),
            fraction,
        };
        Self {
            ambient_temperature_k: 295.15,
            atmospheric_pressure_mmhg: 760.0,
            clothing_resistance_rsi: 0.1,
            convective_coefficient_w_per_m2_k: 4.0,
            ambient_gases: vec![
                gas("Oxygen", 0.21),
                gas("CarbonDioxide", 0.0004),
                gas("Nitrogen", 0.7896),
            ],
        }
    }
}

/// Something that happens during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum Action {
    Stimulus(Stimulus),
    ThermalApplication(ThermalApplication),
    EnvironmentChange(EnvironmentConditions),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Stimulus(_) => "stimulus",
            Action::ThermalApplication(_) => "thermal application",
            Action::EnvironmentChange(_) => "environment change",
        }
    }
}

/// A persistent state set before the engine initializes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "condition")]
pub enum Condition {
    InitialEnvironment(EnvironmentConditions),
    /// Narrowed lower airways; `severity` in [0, 1].
    AirwayObstruction { severity: Real },
}

impl Condition {
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::InitialEnvironment(_) => "Initial Environment",
            Condition::AirwayObstruction { .. } => "Airway Obstruction",
        }
    }
}

/// At most one condition of each kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Add a condition, refusing a second one of the same kind.
    pub fn add(&mut self, condition: Condition) -> SimResult<()> {
        if self.conditions.iter().any(|c| c.kind() == condition.kind()) {
            return Err(SimError::ConflictingCondition {
                kind: condition.kind(),
            });
        }
        if let Condition::AirwayObstruction { severity } = condition {
            if !(0.0..=1.0).contains(&severity) {
                return Err(SimError::InvalidAction {
                    what: format!("airway obstruction severity {severity} outside [0, 1]"),
                });
            }
        }
        self.conditions.push(condition);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> + '_ {
        self.conditions.iter()
    }

    pub fn initial_environment(&self) -> Option<&EnvironmentConditions> {
        self.conditions.iter().find_map(|c| match c {
            Condition::InitialEnvironment(env) => Some(env),
            _ => None,
        })
    }

    pub fn airway_obstruction(&self) -> Option<Real> {
        self.conditions.iter().find_map(|c| match c {
            Condition::AirwayObstruction { severity } => Some(*severity),
            _ => None,
        })
    }
}
