//! Engine configuration (YAML).
//!
//! ```yaml
//! dt_s: 0.02
//! stabilization_time_s: 10.0
//! max_valve_iterations: 25
//! switch_resistances:
//!   thermal:
//!     open: 1.0e100
//!     closed: 1.0e-4
//! ```

use std::path::Path;

use pf_circuit::{Domain, DomainKind, SolveOptions, SwitchResistances};
use pf_core::Real;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Open/closed resistance pair as written in a config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResistancePair {
    pub open: Real,
    pub closed: Real,
}

/// Per-domain switch resistance overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwitchOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluid: Option<ResistancePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermal: Option<ResistancePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrical: Option<ResistancePair>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed time step (seconds).
    pub dt_s: Real,
    /// Simulated time run by `Engine::initialize` after a clear.
    pub stabilization_time_s: Real,
    /// Valve-state passes allowed per circuit solve.
    pub max_valve_iterations: usize,
    pub switch_resistances: SwitchOverrides,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dt_s: 0.02,
            stabilization_time_s: 0.0,
            max_valve_iterations: SolveOptions::default().max_valve_iterations,
            switch_resistances: SwitchOverrides::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> SimResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_yaml(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.dt_s.is_finite() && self.dt_s > 0.0) {
            return Err(SimError::InvalidConfig {
                what: format!("dt_s must be positive, got {}", self.dt_s),
            });
        }
        if !(self.stabilization_time_s.is_finite() && self.stabilization_time_s >= 0.0) {
            return Err(SimError::InvalidConfig {
                what: format!(
                    "stabilization_time_s must be non-negative, got {}",
                    self.stabilization_time_s
                ),
            });
        }
        if self.max_valve_iterations == 0 {
            return Err(SimError::InvalidConfig {
                what: "max_valve_iterations must be positive".to_string(),
            });
        }
        let overrides = [
            self.switch_resistances.fluid,
            self.switch_resistances.thermal,
            self.switch_resistances.electrical,
        ];
        for pair in overrides.into_iter().flatten() {
            let ok = pair.open.is_finite()
                && pair.closed.is_finite()
                && pair.closed > 0.0
                && pair.open > pair.closed;
            if !ok {
                return Err(SimError::InvalidConfig {
                    what: format!("bad switch resistances {pair:?}"),
                });
            }
        }
        Ok(())
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            max_valve_iterations: self.max_valve_iterations,
        }
    }

    /// Switch resistances for circuits of domain `D`.
    pub fn switch_resistances<D: Domain>(&self) -> SwitchResistances {
        let pair = match D::KIND {
            DomainKind::Fluid => self.switch_resistances.fluid,
            DomainKind::Thermal => self.switch_resistances.thermal,
            DomainKind::Electrical => self.switch_resistances.electrical,
        };
        pair.map_or_else(SwitchResistances::of::<D>, |p| SwitchResistances {
            open: p.open,
            closed: p.closed,
        })
    }

    /// Number of whole steps covering `duration_s`.
    pub fn steps_for(&self, duration_s: Real) -> usize {
        if duration_s <= 0.0 {
            return 0;
        }
        (duration_s / self.dt_s).round().max(1.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_circuit::{Fluid, Thermal};

    #[test]
    fn defaults_are_standard() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.dt_s, 0.02);
        cfg.validate().unwrap();
        assert_eq!(cfg.steps_for(1.0), 50);
        assert_eq!(cfg.steps_for(0.0), 0);
    }

    #[test]
    fn yaml_overrides() {
        let cfg = EngineConfig::from_yaml_str(
            "dt_s: 0.01\nswitch_resistances:\n  thermal:\n    open: 1.0e80\n    closed: 1.0e-3\n",
        )
        .unwrap();
        assert_eq!(cfg.dt_s, 0.01);
        assert_eq!(cfg.switch_resistances::<Thermal>().open, 1.0e80);
        assert_eq!(
            cfg.switch_resistances::<Fluid>(),
            SwitchResistances::of::<Fluid>()
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(EngineConfig::from_yaml_str("dt_s: -1.0\n").is_err());
        assert!(EngineConfig::from_yaml_str("max_valve_iterations: 0\n").is_err());
        assert!(
            EngineConfig::from_yaml_str(
                "switch_resistances:\n  fluid:\n    open: 1.0\n    closed: 2.0\n"
            )
            .is_err()
        );
    }
}
