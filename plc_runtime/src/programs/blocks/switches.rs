//! Soft switches.

use super::memory::MemoryVariable;

/// Turns a momentary push-button into a latching switch.
///
/// Each rising edge of the button flips the switch.
#[derive(Debug, Clone, Default)]
pub struct ToggleSoftSwitch {
    state: MemoryVariable<bool>,
}

impl ToggleSoftSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this scan's button state; returns the switch state.
    pub fn update(&mut self, button: &MemoryVariable<bool>) -> bool {
        let next = if button.rising_edge() {
            !self.state.current()
        } else {
            self.state.current()
        };
        self.state.update(next);
        next
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.state.current()
    }

    /// True in the scan the switch turned off.
    #[inline]
    pub fn turned_off(&self) -> bool {
        self.state.falling_edge()
    }

    /// Force the switch off (e.g. on a timeout).
    pub fn force_off(&mut self) {
        self.state.update(false);
    }
}
