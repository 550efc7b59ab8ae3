//! `pushbutton_lamp`: a momentary push-button toggles a lamp.
//!
//! ```toml
//! [program]
//! name = "pushbutton_lamp"
//! [program.params]
//! button = "pushbutton"   # boolean input label
//! lamp = "lamp"           # boolean output label
//! auto_off_s = 600        # optional
//! ```
//!
//! While the button reading is stale the previous reading is held, so a
//! communication glitch never toggles the lamp.

use super::blocks::{MemoryVariable, OnDelayTimer, ToggleSoftSwitch, UpCounter};
use super::{parse_params, require_point, seconds_param};
use crate::cache::IoCache;
use crate::program::{ControlProgram, FaultReason, ProgramError};
use plc_common::config::ProgramConfig;
use plc_common::io::registry::PointRegistry;
use plc_common::point::{Direction, ValueType};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const NAME: &str = "pushbutton_lamp";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LampParams {
    #[serde(default = "default_button")]
    button: String,
    #[serde(default = "default_lamp")]
    lamp: String,
    #[serde(default)]
    auto_off_s: Option<f64>,
}

fn default_button() -> String {
    "pushbutton".to_string()
}

fn default_lamp() -> String {
    "lamp".to_string()
}

pub fn create_program(config: &ProgramConfig) -> Result<Box<dyn ControlProgram>, ProgramError> {
    let params: LampParams = parse_params(config)?;
    let auto_off = params
        .auto_off_s
        .map(|s| seconds_param("auto_off_s", s))
        .transpose()?;
    Ok(Box::new(PushbuttonLamp::new(params.button, params.lamp, auto_off)))
}

pub struct PushbuttonLamp {
    button_label: String,
    lamp_label: String,
    button: MemoryVariable<bool>,
    switch: ToggleSoftSwitch,
    auto_off: Option<OnDelayTimer>,
    presses: UpCounter,
    written: Option<bool>,
}

impl PushbuttonLamp {
    pub fn new(button: String, lamp: String, auto_off: Option<Duration>) -> Self {
        Self {
            button_label: button,
            lamp_label: lamp,
            button: MemoryVariable::new(false),
            switch: ToggleSoftSwitch::new(),
            auto_off: auto_off.map(OnDelayTimer::new),
            presses: UpCounter::new(),
            written: None,
        }
    }

    pub fn presses(&self) -> u64 {
        self.presses.value()
    }

    fn scan(&mut self, cache: &mut IoCache, now: Instant) -> Result<(), ProgramError> {
        let reading = cache
            .bool(&self.button_label)?
            .unwrap_or_else(|| self.button.current());
        self.button.update(reading);
        if self.button.rising_edge() {
            self.presses.count_up();
            debug!("{} pressed ({} total)", self.button_label, self.presses.value());
        }

        let mut on = self.switch.update(&self.button);
        if let Some(timer) = self.auto_off.as_mut() {
            if !on {
                timer.reset();
            } else if timer.has_elapsed(now) {
                info!("{} switched off by timer", self.lamp_label);
                self.switch.force_off();
                timer.reset();
                on = false;
            }
        }

        if self.written != Some(on) {
            cache.write_label(&self.lamp_label, on)?;
            self.written = Some(on);
        }
        Ok(())
    }
}

impl ControlProgram for PushbuttonLamp {
    fn name(&self) -> &str {
        NAME
    }

    fn on_start(&mut self, points: &PointRegistry) -> Result<(), ProgramError> {
        require_point(points, &self.button_label, Direction::Input, ValueType::Boolean)?;
        require_point(points, &self.lamp_label, Direction::Output, ValueType::Boolean)?;
        info!(
            "{}: {} toggles {}",
            NAME, self.button_label, self.lamp_label
        );
        Ok(())
    }

    fn on_cycle(&mut self, cache: &mut IoCache) -> Result<(), ProgramError> {
        self.scan(cache, Instant::now())
    }

    fn on_fault(&mut self, reason: &FaultReason) -> Result<(), ProgramError> {
        warn!("{}: lamp forced to safe state ({})", NAME, reason.cause);
        Ok(())
    }

    fn on_stop(&mut self) -> Result<(), ProgramError> {
        info!("{}: stopped after {} press(es)", NAME, self.presses.value());
        Ok(())
    }
}
