//! `valve_sequencer`: steps an analog valve output through a fixed list of
//! positions, one step every `step_s` seconds.
//!
//! An optional emergency-stop input raises [`ProgramError::Emergency`] when
//! it reads true, which faults the engine.

use super::blocks::{MemoryVariable, SingleScanTimer};
use super::{parse_params, require_point, seconds_param};
use crate::cache::IoCache;
use crate::program::{ControlProgram, ProgramError};
use plc_common::config::ProgramConfig;
use plc_common::io::registry::PointRegistry;
use plc_common::point::{Direction, ValueType};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const NAME: &str = "valve_sequencer";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValveParams {
    #[serde(default = "default_valve")]
    valve: String,
    #[serde(default = "default_positions")]
    positions: Vec<f64>,
    #[serde(default = "default_step_s")]
    step_s: f64,
    #[serde(default = "default_repeat")]
    repeat: bool,
    #[serde(default)]
    emergency_stop: Option<String>,
}

fn default_valve() -> String {
    "valve_position".to_string()
}

fn default_positions() -> Vec<f64> {
    vec![10.0, 5.0, 0.0]
}

fn default_step_s() -> f64 {
    5.0
}

fn default_repeat() -> bool {
    true
}

pub fn create_program(config: &ProgramConfig) -> Result<Box<dyn ControlProgram>, ProgramError> {
    let p: ValveParams = parse_params(config)?;
    if p.positions.is_empty() {
        return Err(ProgramError::Config("positions cannot be empty".into()));
    }
    if let Some(bad) = p.positions.iter().find(|v| !v.is_finite()) {
        return Err(ProgramError::Config(format!("invalid position {bad}")));
    }
    let step = seconds_param("step_s", p.step_s)?;
    Ok(Box::new(ValveSequencer::new(
        p.valve,
        p.positions,
        step,
        p.repeat,
        p.emergency_stop,
    )))
}

pub struct ValveSequencer {
    valve: String,
    positions: Vec<f64>,
    timer: SingleScanTimer,
    repeat: bool,
    emergency_stop: Option<String>,
    step: MemoryVariable<usize>,
    written: bool,
}

impl ValveSequencer {
    /// `positions` must not be empty.
    pub fn new(
        valve: String,
        positions: Vec<f64>,
        step: Duration,
        repeat: bool,
        emergency_stop: Option<String>,
    ) -> Self {
        Self {
            valve,
            positions,
            timer: SingleScanTimer::new(step),
            repeat,
            emergency_stop,
            step: MemoryVariable::new(0),
            written: false,
        }
    }

    /// Index of the position currently requested.
    pub fn step(&self) -> usize {
        self.step.current()
    }

    fn next_step(&self) -> usize {
        let next = self.step.current() + 1;
        match (next < self.positions.len(), self.repeat) {
            (true, _) => next,
            (false, true) => 0,
            (false, false) => self.step.current(),
        }
    }

    fn scan(&mut self, cache: &mut IoCache, now: Instant) -> Result<(), ProgramError> {
        if let Some(label) = &self.emergency_stop {
            if cache.bool(label)? == Some(true) {
                return Err(ProgramError::Emergency(format!("{label} active")));
            }
        }

        // first poll arms the timer
        let next = if self.timer.has_elapsed(now) {
            self.next_step()
        } else {
            self.step.current()
        };
        self.step.update(next);

        if !self.written || self.step.changed() {
            let Some(&position) = self.positions.get(next) else {
                return Err(ProgramError::Failed(format!("no position at step {next}")));
            };
            debug!("{} -> step {} ({})", self.valve, next, position);
            cache.write_label(&self.valve, position)?;
            self.written = true;
        }
        Ok(())
    }
}

impl ControlProgram for ValveSequencer {
    fn name(&self) -> &str {
        NAME
    }

    fn on_start(&mut self, points: &PointRegistry) -> Result<(), ProgramError> {
        require_point(points, &self.valve, Direction::Output, ValueType::Numeric)?;
        if let Some(label) = &self.emergency_stop {
            require_point(points, label, Direction::Input, ValueType::Boolean)?;
        }
        info!(
            "{}: {} through {} position(s)",
            NAME,
            self.valve,
            self.positions.len()
        );
        Ok(())
    }

    fn on_cycle(&mut self, cache: &mut IoCache) -> Result<(), ProgramError> {
        self.scan(cache, Instant::now())
    }

    fn on_stop(&mut self) -> Result<(), ProgramError> {
        info!("{}: stopped at step {}", NAME, self.step.current());
        Ok(())
    }
}
