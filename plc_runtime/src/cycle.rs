//! Scan engine: refresh → logic → flush, paced to the scan period.
//!
//! ## Cycle Loop
//! Deadline = cycle start + period. An overrun starts the next cycle
//! immediately and is counted; missed deadlines are never caught up.
//! The stop flag is checked before each cycle and while sleeping.
//!
//! ## Cycle Watchdog
//! `on_cycle` runs on the logic thread. A call that outlives
//! `cycle_timeout` is a logic failure; the program and the cache are
//! abandoned to that thread and the later hooks are skipped.
//!
//! ## Fault Path
//! A threshold breach, invalid address or logic failure ends the loop.
//! The safe state is applied before any program hook runs, and a fault
//! raised in the same cycle as a stop request takes precedence.

use crate::cache::IoCache;
use crate::error::EngineError;
use crate::notify::{Notifications, fault_message};
use crate::program::{
    ControlProgram, FaultReason, HookOutcome, LogicWorker, ProgramError, guarded, run_hook,
};
use crate::report::{CycleTimes, RunOutcome, RunReport};
use crate::safety::{FailureMonitor, RetryPolicy, SafeStateReport, SafeStateTable};
use crate::state::{RunEvent, RunState, RunStateMachine, TransitionResult};
use plc_common::config::{PlcConfig, RuntimeConfig};
use plc_common::gateway::IoGateway;
use plc_common::io::registry::PointRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Longest uninterrupted sleep while waiting for the next cycle.
const STOP_POLL_SLICE: Duration = Duration::from_millis(10);

/// Overruns logged individually before switching to every 1000th.
const OVERRUN_LOG_FIRST: u64 = 10;

/// Shared stop request flag.
///
/// Set from a signal handler or another thread; the scan thread observes it
/// between cycles.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, returning early on a stop request.
    /// Returns true if a stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(STOP_POLL_SLICE));
        }
    }
}

/// Cycle timing statistics [µs].
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub count: u64,
    pub overruns: u64,
    pub last_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    sum_us: u128,
}

impl CycleStats {
    #[inline]
    pub fn record(&mut self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.min_us = if self.count == 0 { us } else { self.min_us.min(us) };
        self.max_us = self.max_us.max(us);
        self.last_us = us;
        self.sum_us += us as u128;
        self.count += 1;
    }

    #[inline]
    pub fn avg_us(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            (self.sum_us / self.count as u128) as u64
        }
    }

    pub fn times(&self) -> CycleTimes {
        CycleTimes {
            min_us: self.min_us,
            avg_us: self.avg_us(),
            max_us: self.max_us,
        }
    }
}

/// How the RUNNING phase ended.
enum RunEnd {
    Stop,
    Fault { cause: EngineError, state: RunState },
}

/// One run of the PLC: INIT through STOPPED.
///
/// Owns the gateway, the program and all per-run state. Consumed by
/// [`ScanEngine::run`]; a restart builds a new engine.
pub struct ScanEngine {
    runtime: RuntimeConfig,
    gateway: Box<dyn IoGateway>,
    program: Option<Box<dyn ControlProgram>>,
    program_name: String,
    registry: Arc<PointRegistry>,
    /// `None` only after an `on_cycle` overrun.
    cache: Option<IoCache>,
    logic: LogicWorker,
    safe_state: SafeStateTable,
    monitor: FailureMonitor,
    machine: RunStateMachine,
    stop: StopSignal,
    notifications: Option<Notifications>,
    stats: CycleStats,
    errors: Vec<EngineError>,
}

impl ScanEngine {
    /// Build an engine from validated configuration.
    ///
    /// # Errors
    /// `EngineError::Configuration` for bad runtime bounds, an invalid point
    /// table or a safe-state table that does not match the outputs.
    /// `EngineError::LogicFailure` if the logic thread cannot be started.
    pub fn new(
        config: &PlcConfig,
        gateway: Box<dyn IoGateway>,
        program: Box<dyn ControlProgram>,
        stop: StopSignal,
    ) -> Result<Self, EngineError> {
        config
            .runtime
            .validate()
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        let registry = PointRegistry::from_config(&config.points)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        let safe_state = SafeStateTable::from_config(&config.safe_state, &registry)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        let monitor = FailureMonitor::new(config.runtime.failure_threshold, &registry);
        let registry = Arc::new(registry);
        let logic = LogicWorker::spawn()?;

        Ok(Self {
            runtime: config.runtime.clone(),
            gateway,
            program_name: program.name().to_string(),
            program: Some(program),
            cache: Some(IoCache::new(registry.clone())),
            logic,
            registry,
            safe_state,
            monitor,
            machine: RunStateMachine::new(),
            stop,
            notifications: None,
            stats: CycleStats::default(),
            errors: Vec::new(),
        })
    }

    /// Send a fault message through `notifications` once the safe state
    /// of a faulted run is applied.
    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = Some(notifications);
        self
    }

    #[inline]
    pub fn state(&self) -> RunState {
        self.machine.state()
    }

    pub fn safe_state(&self) -> &SafeStateTable {
        &self.safe_state
    }

    /// Drive the run to STOPPED and report how it went.
    pub fn run(mut self) -> RunReport {
        info!(
            "Engine starting: program={}, gateway={}, period={}ms, cycle_timeout={}ms, threshold={}",
            self.program_name,
            self.gateway.name(),
            self.runtime.scan_period_ms,
            self.runtime.cycle_timeout_ms,
            self.monitor.threshold()
        );

        let end = match self.init() {
            Ok(()) => {
                self.transition(RunEvent::InitComplete);
                self.run_cycles()
            }
            Err(cause) => RunEnd::Fault {
                cause,
                state: RunState::Init,
            },
        };

        let mut on_fault = HookOutcome::NotRun;
        let (outcome, safe_state) = match end {
            RunEnd::Fault { cause, state } => {
                error!("FAULT in {}: {}", state, cause);
                self.transition(if state == RunState::Init {
                    RunEvent::InitFailed
                } else {
                    RunEvent::Fault
                });
                let report = self.apply_safe_state();

                let reason = FaultReason {
                    cause: cause.clone(),
                    state,
                    cycle: self.stats.count,
                };
                if let Some(notifications) = &self.notifications {
                    notifications.dispatch(fault_message(&self.program_name, &reason, &report));
                }
                on_fault = self.call_hook("on_fault", move |p| p.on_fault(&reason));
                self.transition(RunEvent::SafeStateApplied);
                (RunOutcome::Faulted { cause }, report)
            }
            RunEnd::Stop => {
                self.transition(RunEvent::StopRequested);
                (RunOutcome::CleanStop, self.apply_safe_state())
            }
        };

        // DRAINING
        let on_stop = self.call_hook("on_stop", |p| p.on_stop());
        if let Err(e) = self.gateway.disconnect() {
            warn!("Gateway disconnect failed: {}", e);
        }
        self.transition(RunEvent::Drained);

        info!(
            "Engine stopped after {} cycle(s), {} overrun(s), avg {}us",
            self.stats.count,
            self.stats.overruns,
            self.stats.avg_us()
        );

        RunReport {
            program: self.program_name,
            gateway: self.gateway.name().to_string(),
            outcome,
            final_state: self.machine.state(),
            cycles: self.stats.count,
            overruns: self.stats.overruns,
            cycle_time: self.stats.times(),
            transitions: self.machine.history().to_vec(),
            safe_state,
            on_fault,
            on_stop,
            diagnostics: self.gateway.diagnostics(),
            errors: self.errors,
        }
    }

    /// Connect, read every point once, start the program.
    fn init(&mut self) -> Result<(), EngineError> {
        self.gateway
            .connect()
            .map_err(|e| EngineError::CommunicationFailure {
                address: self.gateway.name().to_string(),
                detail: e.to_string(),
            })?;
        info!("Gateway '{}' connected", self.gateway.name());

        let addresses: Vec<_> = self.registry.iter().map(|b| b.address.clone()).collect();
        let results = self.gateway.read_points(&addresses);
        for (address, result) in addresses.iter().zip(results) {
            match result {
                Ok(pv) => trace!("initial read {} = {:?}", address, pv.value()),
                Err(e) if e.is_communication() => {
                    warn!("initial read {} failed: {}", address, e);
                }
                Err(e) => return Err(EngineError::from_gateway(address, &e)),
            }
        }
        debug!("Read {} point(s)", addresses.len());

        let Some(program) = self.program.as_mut() else {
            return Err(EngineError::logic("program unavailable"));
        };
        guarded(|| program.on_start(&self.registry))?;
        info!("Program '{}' started", self.program_name);
        Ok(())
    }

    fn run_cycles(&mut self) -> RunEnd {
        let period = self.runtime.scan_period();
        loop {
            if self.stop.is_requested() {
                info!("Stop requested after {} cycle(s)", self.stats.count);
                return RunEnd::Stop;
            }
            if self.runtime.max_cycles.is_some_and(|max| self.stats.count >= max) {
                info!("Cycle limit {} reached", self.stats.count);
                return RunEnd::Stop;
            }

            let start = Instant::now();
            if let Err(cause) = self.cycle() {
                return RunEnd::Fault {
                    cause,
                    state: RunState::Running,
                };
            }
            let elapsed = start.elapsed();
            self.stats.record(elapsed);

            if elapsed > period {
                self.stats.overruns += 1;
                let n = self.stats.overruns;
                if n <= OVERRUN_LOG_FIRST || n % 1000 == 0 {
                    warn!(
                        "Cycle overrun #{}: {}us (period {}ms)",
                        n,
                        elapsed.as_micros(),
                        self.runtime.scan_period_ms
                    );
                }
            } else {
                self.stop.sleep(period - elapsed);
            }
        }
    }

    /// One scan: refresh, threshold check, program, flush.
    fn cycle(&mut self) -> Result<(), EngineError> {
        let Some(cache) = self.cache.as_mut() else {
            return Err(EngineError::logic("I/O cache unavailable"));
        };
        let outcome = cache.refresh(self.gateway.as_mut());
        if let Some((address, e)) = outcome.fatal() {
            return Err(EngineError::from_gateway(address, e));
        }
        for (address, e) in &outcome.failures {
            debug!("cycle {}: read {} failed: {}", self.stats.count, address, e);
        }
        if let Some(breach) = self.monitor.check(cache) {
            return Err(EngineError::CommunicationFailure {
                address: breach.address.to_string(),
                detail: format!(
                    "{} consecutive failed reads (threshold {})",
                    breach.consecutive_failures,
                    self.monitor.threshold()
                ),
            });
        }

        let (Some(program), Some(cache)) = (self.program.take(), self.cache.take()) else {
            return Err(EngineError::logic("program unavailable"));
        };
        let timeout = self.runtime.cycle_timeout();
        let (program, cache, result) = self.logic.run(program, cache, timeout)?;
        self.program = Some(program);
        let cache = self.cache.insert(cache);
        result?;

        let outcome = cache.flush(self.gateway.as_mut());
        if let Some((address, e)) = outcome.fatal() {
            return Err(EngineError::from_gateway(address, e));
        }
        for (address, e) in &outcome.failures {
            warn!("write {} failed, retrying next cycle: {}", address, e);
        }
        trace!("cycle {} done", self.stats.count);
        Ok(())
    }

    fn apply_safe_state(&mut self) -> SafeStateReport {
        let policy = RetryPolicy {
            attempts: self.runtime.write_retries,
            backoff: self.runtime.retry_backoff(),
        };
        let report = self.safe_state.apply(self.gateway.as_mut(), policy);
        if report.is_complete() {
            info!(
                "Safe state applied to {} output(s) in {:.1}ms",
                report.applied.len(),
                report.duration_ms
            );
        } else {
            let outputs: Vec<String> = report.failed.iter().map(|f| f.address.clone()).collect();
            error!("Safe state incomplete: {:?}", outputs);
            self.errors
                .push(EngineError::SafeStateWriteFailure { outputs });
        }
        report
    }

    /// Run a best-effort hook bounded by `shutdown_timeout`.
    fn call_hook<F>(&mut self, hook: &'static str, f: F) -> HookOutcome
    where
        F: FnOnce(&mut dyn ControlProgram) -> Result<(), ProgramError> + Send + 'static,
    {
        let Some(program) = self.program.take() else {
            debug!("{} skipped: program lost to an earlier timeout", hook);
            return HookOutcome::Skipped;
        };
        let (program, outcome) = run_hook(program, hook, self.runtime.shutdown_timeout(), f);
        self.program = program;
        outcome
    }

    fn transition(&mut self, event: RunEvent) {
        let from = self.machine.state();
        match self.machine.handle_event(event) {
            TransitionResult::Ok(to) => info!("State {} -> {} ({:?})", from, to, event),
            TransitionResult::Rejected(reason) => {
                error!("Rejected {:?} in {}: {}", event, from, reason);
            }
        }
    }
}
