//! Run-state transitions.
//!
//! `Init → Running → Draining → Stopped`, with `Running → Faulted → Draining`
//! and `Init → Faulted` on startup failure. `Stopped` is terminal; a restart
//! builds a new engine with a new machine.

use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Running,
    Faulted,
    Draining,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Faulted => "FAULTED",
            Self::Draining => "DRAINING",
            Self::Stopped => "STOPPED",
        })
    }
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// New state.
    Ok(RunState),
    /// Why the event was refused.
    Rejected(&'static str),
}

/// Event that can trigger a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// Gateway connected, every point read once, `on_start` succeeded.
    InitComplete,
    /// Any INIT step failed.
    InitFailed,
    /// Threshold breach, invalid address or logic failure while running.
    Fault,
    /// Signal or cycle limit.
    StopRequested,
    /// Safe state applied (or retries exhausted) and `on_fault` returned.
    SafeStateApplied,
    /// `on_stop` done and gateway released.
    Drained,
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub from: RunState,
    pub to: RunState,
    pub event: RunEvent,
    /// Time since the machine was created [ms].
    pub elapsed_ms: f64,
}

/// Run-state owner. Only the scan engine holds one.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    state: RunState,
    created: Instant,
    history: Vec<TransitionRecord>,
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Init,
            created: Instant::now(),
            history: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Transitions taken so far, oldest first.
    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Attempt a transition given an event.
    pub fn handle_event(&mut self, event: RunEvent) -> TransitionResult {
        use RunEvent::*;
        use RunState::*;

        let next = match (self.state, event) {
            (Init, InitComplete) => Running,
            (Init, InitFailed) => Faulted,
            (Running, Fault) => Faulted,
            (Running, StopRequested) => Draining,
            (Faulted, SafeStateApplied) => Draining,
            (Draining, Drained) => Stopped,
            _ => return TransitionResult::Rejected(invalid_transition_reason(self.state)),
        };

        self.history.push(TransitionRecord {
            from: self.state,
            to: next,
            event,
            elapsed_ms: self.created.elapsed().as_secs_f64() * 1000.0,
        });
        self.state = next;
        TransitionResult::Ok(next)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state == RunState::Stopped
    }

    /// True once the run has passed through FAULTED.
    pub fn has_faulted(&self) -> bool {
        self.history.iter().any(|t| t.to == RunState::Faulted)
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_transition_reason(state: RunState) -> &'static str {
    match state {
        RunState::Init => "Init: only InitComplete or InitFailed allowed",
        RunState::Running => "Running: only Fault or StopRequested allowed",
        RunState::Faulted => "Faulted: only SafeStateApplied allowed",
        RunState::Draining => "Draining: only Drained allowed",
        RunState::Stopped => "Stopped: terminal",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
