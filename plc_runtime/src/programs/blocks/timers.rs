//! Scan-driven timers.
//!
//! Each timer starts on its first poll and is polled once per scan with
//! the scan's timestamp, so tests can drive time explicitly.

use std::time::{Duration, Instant};

/// Fires in exactly one scan each time `period` elapses, then re-arms.
#[derive(Debug, Clone)]
pub struct SingleScanTimer {
    period: Duration,
    started: Option<Instant>,
}

impl SingleScanTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started: None,
        }
    }

    pub fn has_elapsed(&mut self, now: Instant) -> bool {
        let started = *self.started.get_or_insert(now);
        if now.saturating_duration_since(started) >= self.period {
            self.started = None;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.started = None;
    }
}

/// False until `delay` has elapsed, then true until reset.
#[derive(Debug, Clone)]
pub struct OnDelayTimer {
    delay: Duration,
    started: Option<Instant>,
}

impl OnDelayTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: None,
        }
    }

    pub fn has_elapsed(&mut self, now: Instant) -> bool {
        let started = *self.started.get_or_insert(now);
        now.saturating_duration_since(started) >= self.delay
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn reset(&mut self) {
        self.started = None;
    }
}

/// True until `delay` has elapsed, then false until reset.
#[derive(Debug, Clone)]
pub struct OffDelayTimer {
    delay: Duration,
    started: Option<Instant>,
}

impl OffDelayTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: None,
        }
    }

    pub fn running(&mut self, now: Instant) -> bool {
        let started = *self.started.get_or_insert(now);
        now.saturating_duration_since(started) < self.delay
    }

    pub fn reset(&mut self) {
        self.started = None;
    }
}
