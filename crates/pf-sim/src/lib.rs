//! pf-sim: time-stepping engine for coupled physiology networks.
//!
//! Provides:
//! - `PhysiologySystem` three-phase contract (pre-process, process, post-process)
//! - `Engine` that solves every circuit once per step, commits, then runs
//!   substance transport
//! - Actions, stimuli and persistent conditions
//! - Snapshots of committed state (serde / JSON)
//! - `SharedEngine` for driving an engine from another thread
//! - Reference environment and respiration systems

pub mod actions;
pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod shared;
pub mod snapshot;
pub mod system;
pub mod systems;

pub use actions::{
    Action, AppliedTemperature, Condition, ConditionSet, EnvironmentConditions, GasFraction,
    Stimulus, SwitchCommand, ThermalApplication, ThermalEffect,
};
pub use cache::GenerationCache;
pub use config::EngineConfig;
pub use data::{BoundGraph, EngineData, Network, NetworkDomain, Networks};
pub use engine::{Engine, StepReport};
pub use error::{SimError, SimResult};
pub use shared::SharedEngine;
pub use snapshot::{EngineSnapshot, SystemSnapshot};
pub use system::PhysiologySystem;
pub use systems::{EnvironmentSettings, EnvironmentSystem, RespirationSettings, RespirationSystem};
