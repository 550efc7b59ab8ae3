//! Bundled control programs and their registry.
//!
//! - [`lamp`] - `pushbutton_lamp`: push-button toggles a lamp
//! - [`valve`] - `valve_sequencer`: steps an analog valve through positions
//! - [`blocks`] - memory variables, timers, counters, soft switches

pub mod blocks;
pub mod lamp;
pub mod valve;

use crate::program::{ControlProgram, ProgramError};
use plc_common::config::ProgramConfig;
use plc_common::io::registry::PointRegistry;
use plc_common::point::{Direction, ValueType};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Builds a fresh program instance from its configuration.
pub type ProgramFactory = fn(&ProgramConfig) -> Result<Box<dyn ControlProgram>, ProgramError>;

/// Registry of available control programs.
pub struct ProgramRegistry {
    factories: HashMap<&'static str, ProgramFactory>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every bundled program.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(lamp::NAME, lamp::create_program);
        registry.register(valve::NAME, valve::create_program);
        registry
    }

    /// # Panics
    /// Panics if a program with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: ProgramFactory) {
        if self.factories.contains_key(name) {
            panic!("Program '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Build the program named in `config.name`.
    pub fn create(&self, config: &ProgramConfig) -> Result<Box<dyn ControlProgram>, ProgramError> {
        let factory = self.factories.get(config.name.as_str()).ok_or_else(|| {
            ProgramError::Config(format!(
                "unknown program '{}' (available: {})",
                config.name,
                self.list().join(", ")
            ))
        })?;
        factory(config)
    }

    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Deserialize a program's `[program.params]` table.
pub(crate) fn parse_params<P: DeserializeOwned>(config: &ProgramConfig) -> Result<P, ProgramError> {
    toml::Value::Table(config.params.clone())
        .try_into()
        .map_err(|e| ProgramError::Config(format!("{}: {}", config.name, e)))
}

/// A positive duration given in seconds. Values too large for a
/// `Duration` are rejected instead of panicking.
pub(crate) fn seconds_param(name: &str, seconds: f64) -> Result<Duration, ProgramError> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(ProgramError::Config(format!(
            "{name} must be > 0, got {seconds}"
        )));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| ProgramError::Config(format!("{name} = {seconds}: {e}")))
}

/// Check that `label` names a point with the given direction and type.
pub(crate) fn require_point(
    points: &PointRegistry,
    label: &str,
    direction: Direction,
    value_type: ValueType,
) -> Result<(), ProgramError> {
    let binding = points
        .by_label(label)
        .ok_or_else(|| ProgramError::Config(format!("no point labelled '{label}'")))?;
    let address = &binding.address;
    if address.direction() != direction || address.value_type() != value_type {
        return Err(ProgramError::Config(format!(
            "'{label}' ({address}) must be a {value_type} {direction}"
        )));
    }
    Ok(())
}
