//! Final run report and process exit codes.

use crate::error::EngineError;
use crate::program::HookOutcome;
use crate::safety::SafeStateReport;
use crate::state::{RunState, TransitionRecord};
use plc_common::gateway::GatewayDiagnostics;
use serde::Serialize;

/// Clean stop (signal or cycle limit).
pub const EXIT_CLEAN: i32 = 0;
/// The last run ended in FAULTED.
pub const EXIT_FAULTED: i32 = 1;
/// Configuration or CLI error; no engine was built.
pub const EXIT_STARTUP: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    CleanStop,
    Faulted { cause: EngineError },
}

/// Cycle time summary [µs].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CycleTimes {
    pub min_us: u64,
    pub avg_us: u64,
    pub max_us: u64,
}

/// Everything one engine run did, serialisable for `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub program: String,
    pub gateway: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub final_state: RunState,
    pub cycles: u64,
    pub overruns: u64,
    pub cycle_time: CycleTimes,
    pub transitions: Vec<TransitionRecord>,
    pub safe_state: SafeStateReport,
    pub on_fault: HookOutcome,
    pub on_stop: HookOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<GatewayDiagnostics>,
    /// Errors raised after the deciding one (e.g. unconfirmed safe-state writes).
    pub errors: Vec<EngineError>,
}

impl RunReport {
    #[inline]
    pub fn is_faulted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Faulted { .. })
    }

    pub fn cause(&self) -> Option<&EngineError> {
        match &self.outcome {
            RunOutcome::Faulted { cause } => Some(cause),
            RunOutcome::CleanStop => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_faulted() {
            EXIT_FAULTED
        } else {
            EXIT_CLEAN
        }
    }
}

/// All runs of one process, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub restarts: u32,
    pub runs: Vec<RunReport>,
}

impl SessionReport {
    pub fn last(&self) -> Option<&RunReport> {
        self.runs.last()
    }

    /// Exit code of the last run.
    pub fn exit_code(&self) -> i32 {
        self.last().map_or(EXIT_CLEAN, RunReport::exit_code)
    }
}
