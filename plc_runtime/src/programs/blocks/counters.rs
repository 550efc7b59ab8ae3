//! Event counters. Down counting stops at zero.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpCounter {
    value: u64,
}

impl UpCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn count_up(&mut self) {
        self.value = self.value.saturating_add(1);
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

/// Counts down from a preset; `reset` reloads the preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownCounter {
    preset: u64,
    value: u64,
}

impl DownCounter {
    pub fn new(preset: u64) -> Self {
        Self {
            preset,
            value: preset,
        }
    }

    #[inline]
    pub fn count_down(&mut self) {
        self.value = self.value.saturating_sub(1);
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.value == 0
    }

    pub fn reset(&mut self) {
        self.value = self.preset;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpDownCounter {
    preset: u64,
    value: u64,
}

impl UpDownCounter {
    pub fn new(preset: u64) -> Self {
        Self {
            preset,
            value: preset,
        }
    }

    #[inline]
    pub fn count_up(&mut self) {
        self.value = self.value.saturating_add(1);
    }

    #[inline]
    pub fn count_down(&mut self) {
        self.value = self.value.saturating_sub(1);
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = self.preset;
    }
}
