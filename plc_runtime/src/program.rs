//! Control program capability set.
//!
//! A program only ever sees the [`IoCache`]; it never holds the gateway.
//! `on_cycle` runs on a persistent logic thread and the scan thread waits
//! at most `cycle_timeout` for it. `on_fault` and `on_stop` run on a helper
//! thread with a bounded wait. Neither a hung cycle nor a hung hook can
//! keep the outputs out of the safe state.

use crate::cache::{CacheError, IoCache};
use crate::error::EngineError;
use crate::state::RunState;
use plc_common::io::registry::PointRegistry;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgramError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Raised by the program itself; always faults the engine.
    #[error("emergency: {0}")]
    Emergency(String),

    #[error("{0}")]
    Failed(String),

    /// Bad program parameters or missing points.
    #[error("invalid program configuration: {0}")]
    Config(String),
}

/// Why the engine faulted, handed to `on_fault`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultReason {
    pub cause: EngineError,
    /// State the fault was raised from (INIT or RUNNING).
    pub state: RunState,
    /// Cycles completed before the fault.
    pub cycle: u64,
}

/// User control logic.
///
/// Per-run state lives in the implementing value; a restart builds a new
/// instance through the program registry.
pub trait ControlProgram: Send {
    fn name(&self) -> &str;

    /// Called once in INIT after the gateway connected.
    fn on_start(&mut self, points: &PointRegistry) -> Result<(), ProgramError>;

    /// One scan: read inputs and stage outputs through the cache.
    fn on_cycle(&mut self, cache: &mut IoCache) -> Result<(), ProgramError>;

    /// Best-effort notification after the safe state was applied.
    fn on_fault(&mut self, _reason: &FaultReason) -> Result<(), ProgramError> {
        Ok(())
    }

    /// Best-effort cleanup in DRAINING.
    fn on_stop(&mut self) -> Result<(), ProgramError> {
        Ok(())
    }
}

/// Result of a best-effort hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HookOutcome {
    #[default]
    NotRun,
    Ok,
    Failed { message: String },
    Panicked { message: String },
    TimedOut { timeout_ms: u64 },
    /// The program was lost to an earlier timeout.
    Skipped,
}

/// Run `f` on the scan thread, turning errors and panics into a logic failure.
pub(crate) fn guarded<F>(f: F) -> Result<(), EngineError>
where
    F: FnOnce() -> Result<(), ProgramError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(EngineError::logic(e.to_string())),
        Err(payload) => Err(EngineError::logic(format!(
            "program panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Run a best-effort hook on a helper thread.
///
/// The program is moved to the helper and handed back when the hook
/// returns. If the hook outlives `timeout` the program is abandoned to the
/// helper thread and `None` comes back.
pub(crate) fn run_hook<F>(
    program: Box<dyn ControlProgram>,
    hook: &'static str,
    timeout: Duration,
    f: F,
) -> (Option<Box<dyn ControlProgram>>, HookOutcome)
where
    F: FnOnce(&mut dyn ControlProgram) -> Result<(), ProgramError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name(format!("plc-{hook}"))
        .spawn(move || {
            let mut program = program;
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(program.as_mut())));
            // Receiver is gone after a timeout.
            let _ = tx.send((program, result));
        });
    if let Err(e) = spawned {
        error!("Cannot spawn {} thread: {}", hook, e);
        return (
            None,
            HookOutcome::Failed {
                message: format!("cannot spawn hook thread: {e}"),
            },
        );
    }

    match rx.recv_timeout(timeout) {
        Ok((program, Ok(Ok(())))) => {
            debug!("{} completed", hook);
            (Some(program), HookOutcome::Ok)
        }
        Ok((program, Ok(Err(e)))) => {
            warn!("{} failed: {}", hook, e);
            (
                Some(program),
                HookOutcome::Failed {
                    message: e.to_string(),
                },
            )
        }
        Ok((program, Err(payload))) => {
            let message = panic_message(payload.as_ref());
            warn!("{} panicked: {}", hook, message);
            (Some(program), HookOutcome::Panicked { message })
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!("{} did not return within {:?}, abandoning program", hook, timeout);
            (
                None,
                HookOutcome::TimedOut {
                    timeout_ms: timeout.as_millis() as u64,
                },
            )
        }
        Err(RecvTimeoutError::Disconnected) => {
            warn!("{} thread exited without a result", hook);
            (
                None,
                HookOutcome::Failed {
                    message: "hook thread exited without a result".to_string(),
                },
            )
        }
    }
}

/// Program and cache handed back by the logic thread, with the cycle result.
pub(crate) type CycleDone = (Box<dyn ControlProgram>, IoCache, Result<(), EngineError>);

/// Persistent thread executing `on_cycle`.
///
/// Each cycle moves the program and the cache to the thread and waits for
/// them with a deadline. On overrun both stay with the thread; when the
/// call finally returns they are dropped there.
pub(crate) struct LogicWorker {
    jobs: Sender<(Box<dyn ControlProgram>, IoCache)>,
    done: Receiver<CycleDone>,
}

impl LogicWorker {
    pub(crate) fn spawn() -> Result<Self, EngineError> {
        let (jobs, job_rx) = mpsc::channel::<(Box<dyn ControlProgram>, IoCache)>();
        let (done_tx, done) = mpsc::channel();
        thread::Builder::new()
            .name("plc-logic".to_string())
            .spawn(move || {
                for (mut program, mut cache) in job_rx {
                    let result = guarded(|| program.on_cycle(&mut cache));
                    // Receiver is gone once the engine gave up on this cycle.
                    if done_tx.send((program, cache, result)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| EngineError::logic(format!("cannot spawn logic thread: {e}")))?;
        Ok(Self { jobs, done })
    }

    /// Run one `on_cycle`, waiting at most `timeout`.
    ///
    /// # Errors
    /// `EngineError::LogicFailure` when the call overran or the thread is
    /// gone. The program and cache are lost in both cases.
    pub(crate) fn run(
        &self,
        program: Box<dyn ControlProgram>,
        cache: IoCache,
        timeout: Duration,
    ) -> Result<CycleDone, EngineError> {
        if self.jobs.send((program, cache)).is_err() {
            return Err(EngineError::logic("logic thread exited"));
        }
        match self.done.recv_timeout(timeout) {
            Ok(done) => Ok(done),
            Err(RecvTimeoutError::Timeout) => {
                error!("on_cycle did not return within {:?}, abandoning program", timeout);
                Err(EngineError::logic(format!(
                    "on_cycle did not return within {}ms",
                    timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(EngineError::logic("logic thread exited without a result"))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
