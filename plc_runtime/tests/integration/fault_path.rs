//! Integration test: fault handling.
//!
//! Validates the fault lifecycle:
//! 1. Communication, address and logic failures → FAULTED
//! 2. Safe state written before any program hook
//! 3. Hook failures, panics and hangs never keep the engine from STOPPED

use super::common::*;
use plc_common::config::GatewayConfig;
use plc_common::gateway::{GatewayError, IoGateway};
use plc_common::io::registry::PointRegistry;
use plc_common::point::Value;
use plc_gateway::{IoOp, SimulationGateway};
use plc_runtime::StopSignal;
use plc_runtime::error::EngineError;
use plc_runtime::program::HookOutcome;
use plc_runtime::report::{EXIT_FAULTED, RunOutcome, RunReport};
use plc_runtime::safety::{RetryPolicy, SafeStateTable};
use plc_runtime::state::RunState;
use std::time::{Duration, Instant};

fn unreachable() -> GatewayError {
    GatewayError::Unreachable("cable pulled".into())
}

fn path(report: &RunReport) -> Vec<RunState> {
    let mut states = vec![RunState::Init];
    states.extend(report.transitions.iter().map(|t| t.to));
    states
}

// ── Communication threshold ─────────────────────────────────────────

#[test]
fn relay1_forced_off_within_bound() {
    let cfg = config(
        "scan_period_ms = 100\nio_timeout_ms = 500\nfailure_threshold = 3\nretry_backoff_ms = 5",
    );
    let (gw, handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();
    let stop = StopSignal::new();

    let created = Instant::now();
    let engine = spawn(&cfg, gw, program.boxed(), stop);
    assert!(wait_written(
        &handle,
        &relay1(),
        Value::Bool(true),
        Duration::from_secs(2)
    ));

    let injected = Instant::now();
    handle.fail_point(&sensor(), unreachable());
    let report = engine.join().unwrap();

    let bound = Duration::from_millis(3 * 100 + 500);
    let safe_write = handle
        .events()
        .into_iter()
        .find(|e| {
            e.at >= injected
                && e.op == IoOp::Write
                && e.address == relay1()
                && e.value == Some(Value::Bool(false))
        })
        .expect("relay1 safe-state write");
    assert!(safe_write.at - injected <= bound);

    let draining = report
        .transitions
        .iter()
        .find(|t| t.to == RunState::Draining)
        .unwrap();
    let draining_at = created + Duration::from_secs_f64(draining.elapsed_ms / 1000.0);
    assert!(draining_at.saturating_duration_since(injected) <= bound);

    assert!(matches!(
        report.cause(),
        Some(EngineError::CommunicationFailure { address, .. }) if address == "di/1_01"
    ));
    assert_eq!(
        path(&report),
        vec![
            RunState::Init,
            RunState::Running,
            RunState::Faulted,
            RunState::Draining,
            RunState::Stopped
        ]
    );
    assert_eq!(report.exit_code(), EXIT_FAULTED);

    let faults = tally.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].state, RunState::Running);
    assert_eq!(report.on_fault, HookOutcome::Ok);
    assert_eq!(report.on_stop, HookOutcome::Ok);
}

#[test]
fn timeouts_count_toward_threshold() {
    let cfg = config(
        "scan_period_ms = 5\nio_timeout_ms = 10\nfailure_threshold = 2\nwrite_retries = 1",
    );
    let (gw, handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();
    let engine = spawn(&cfg, gw, program.boxed(), StopSignal::new());
    assert!(tally.wait_cycles(2, Duration::from_secs(2)));

    handle.set_latency(Duration::from_millis(30));
    let report = engine.join().unwrap();

    assert!(matches!(
        report.cause(),
        Some(EngineError::CommunicationFailure { .. })
    ));
    assert!(report.diagnostics.unwrap().timeouts >= 2);
}

#[test]
fn optional_input_never_faults() {
    let mut cfg = config("scan_period_ms = 2\nmax_cycles = 10\nfailure_threshold = 1");
    cfg.points[0].required = false;
    let (gw, handle) = simulation(&cfg);
    handle.fail_point(&sensor(), unreachable());
    let (program, _tally) = Scripted::new();

    let report = run(&cfg, gw, program.boxed());

    assert_eq!(report.outcome, RunOutcome::CleanStop);
    assert_eq!(report.cycles, 10);
}

// ── INIT failures ───────────────────────────────────────────────────

#[test]
fn invalid_address_fails_init() {
    let cfg = config("scan_period_ms = 5");
    let (gw, handle) = simulation(&cfg);
    handle.fail_point(&sensor(), GatewayError::InvalidAddress("404".into()));
    let (program, tally) = Scripted::new();

    let report = run(&cfg, gw, program.boxed());

    assert!(matches!(
        report.cause(),
        Some(EngineError::InvalidAddress { .. })
    ));
    assert_eq!(
        path(&report),
        vec![
            RunState::Init,
            RunState::Faulted,
            RunState::Draining,
            RunState::Stopped
        ]
    );
    assert_eq!(report.cycles, 0);
    assert!(!tally.started.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(tally.faults()[0].state, RunState::Init);
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
}

#[test]
fn unreachable_gateway_fails_init() {
    let cfg = config("scan_period_ms = 5\nwrite_retries = 2\nretry_backoff_ms = 1");
    let (gw, handle) = simulation(&cfg);
    handle.set_unreachable(true);
    let (program, _tally) = Scripted::new();

    let report = run(&cfg, gw, program.boxed());

    assert!(report.is_faulted());
    assert_eq!(report.final_state, RunState::Stopped);
    // nothing could be confirmed, and that is reported rather than retried forever
    assert_eq!(report.safe_state.failed.len(), 2);
    assert!(report.safe_state.failed.iter().all(|f| f.attempts == 2));
    assert!(
        report
            .errors
            .iter()
            .any(|e| matches!(e, EngineError::SafeStateWriteFailure { outputs } if outputs.len() == 2))
    );
}

#[test]
fn start_error_faults() {
    let mut cfg = config("scan_period_ms = 5");
    cfg.points[1].label = "lamp".into();
    let (gw, _handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();

    let report = run(&cfg, gw, program.boxed());

    assert!(matches!(report.cause(), Some(EngineError::LogicFailure { .. })));
    assert!(!tally.started.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(tally.cycles(), 0);
}

// ── Running failures ────────────────────────────────────────────────

#[test]
fn invalid_address_while_running_faults() {
    let cfg = config("scan_period_ms = 5");
    let (gw, handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();
    let engine = spawn(&cfg, gw, program.boxed(), StopSignal::new());
    assert!(tally.wait_cycles(2, Duration::from_secs(2)));

    handle.fail_point(&sensor(), GatewayError::InvalidAddress("gone".into()));
    let report = engine.join().unwrap();

    assert!(matches!(
        report.cause(),
        Some(EngineError::InvalidAddress { address, .. }) if address == "di/1_01"
    ));
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
}

#[test]
fn program_error_is_logic_failure() {
    let cfg = config("scan_period_ms = 2");
    let (gw, handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();

    let report = run(&cfg, gw, program.fail_at(3).boxed());

    assert!(matches!(
        report.cause(),
        Some(EngineError::LogicFailure { message }) if message.contains("cycle 3")
    ));
    assert_eq!(report.cycles, 2);
    assert_eq!(tally.faults()[0].cycle, 2);
    // relay1 was staged true in the failing cycle but never flushed after the fault
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
}

#[test]
fn program_panic_is_logic_failure() {
    let cfg = config("scan_period_ms = 2");
    let (gw, _handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();

    let report = run(&cfg, gw, program.panic_at(2).boxed());

    assert!(matches!(
        report.cause(),
        Some(EngineError::LogicFailure { message }) if message.contains("panicked")
    ));
    assert_eq!(report.final_state, RunState::Stopped);
    // program survives the caught panic and still gets its hooks
    assert_eq!(tally.faults().len(), 1);
    assert_eq!(tally.stops(), 1);
}

#[test]
fn fault_wins_over_stop_in_same_cycle() {
    let cfg = config("scan_period_ms = 2");
    let (gw, _handle) = simulation(&cfg);
    let (program, _tally) = Scripted::new();
    let stop = StopSignal::new();
    let program = program.stop_at(3, stop.clone()).fail_at(3);

    let report = spawn(&cfg, gw, program.boxed(), stop).join().unwrap();

    assert!(report.is_faulted());
    assert!(report.transitions.iter().any(|t| t.to == RunState::Faulted));
}

#[test]
fn hung_cycle_forces_safe_state_within_cycle_timeout() {
    let cfg = config("scan_period_ms = 10\ncycle_timeout_ms = 100\nretry_backoff_ms = 5");
    let (gw, handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();
    let stop = StopSignal::new();
    let program = program.hang_at(3, Duration::from_secs(5));

    let engine = spawn(&cfg, gw, program.boxed(), stop.clone());
    assert!(tally.wait_cycles(3, Duration::from_secs(2)));
    let hung = Instant::now();
    // a stop request cannot interrupt the call; the watchdog must
    stop.request();
    let report = engine.join().unwrap();

    assert!(hung.elapsed() < Duration::from_secs(1));
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
    assert_eq!(handle.last_written(&valve()), Some(Value::Number(2.5)));
    assert!(report.safe_state.is_complete());
    assert!(matches!(
        report.cause(),
        Some(EngineError::LogicFailure { message }) if message.contains("within 100ms")
    ));
    assert_eq!(report.exit_code(), EXIT_FAULTED);
    assert_eq!(report.final_state, RunState::Stopped);
    // the program is still stuck in cycle 3
    assert_eq!(report.on_fault, HookOutcome::Skipped);
    assert_eq!(report.on_stop, HookOutcome::Skipped);
    assert_eq!(tally.stops(), 0);
}

#[test]
fn slow_cycle_under_timeout_is_only_an_overrun() {
    let cfg = config("scan_period_ms = 5\ncycle_timeout_ms = 500\nmax_cycles = 3");
    let (gw, _handle) = simulation(&cfg);
    let (program, _tally) = Scripted::new();
    let program = program.cycle_time(Duration::from_millis(20));

    let report = run(&cfg, gw, program.boxed());

    assert_eq!(report.outcome, RunOutcome::CleanStop);
    assert_eq!(report.cycles, 3);
    assert_eq!(report.overruns, 3);
}

// ── Hooks ───────────────────────────────────────────────────────────

#[test]
fn failing_hooks_still_reach_stopped() {
    let cfg = config("scan_period_ms = 2");
    let (gw, handle) = simulation(&cfg);
    let (program, _tally) = Scripted::new();
    let program = program
        .fail_at(2)
        .on_fault(Hook::Fail)
        .on_stop(Hook::Panic);

    let report = run(&cfg, gw, program.boxed());

    assert_eq!(report.final_state, RunState::Stopped);
    assert!(matches!(report.on_fault, HookOutcome::Failed { .. }));
    assert!(matches!(report.on_stop, HookOutcome::Panicked { .. }));
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
    assert!(!handle.is_connected());
}

#[test]
fn hung_fault_hook_is_abandoned() {
    let cfg = config("scan_period_ms = 2\nshutdown_timeout_ms = 100");
    let (gw, handle) = simulation(&cfg);
    let (program, tally) = Scripted::new();
    let program = program
        .fail_at(1)
        .on_fault(Hook::Hang(Duration::from_secs(3)));

    let start = Instant::now();
    let report = run(&cfg, gw, program.boxed());

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(report.final_state, RunState::Stopped);
    assert_eq!(report.on_fault, HookOutcome::TimedOut { timeout_ms: 100 });
    assert_eq!(report.on_stop, HookOutcome::Skipped);
    assert_eq!(tally.stops(), 0);
    // the safe state went out before the hook was even called
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
}

#[test]
fn hung_stop_hook_is_bounded() {
    let cfg = config("scan_period_ms = 2\nmax_cycles = 2\nshutdown_timeout_ms = 50");
    let (gw, _handle) = simulation(&cfg);
    let (program, _tally) = Scripted::new();
    let program = program.on_stop(Hook::Hang(Duration::from_secs(3)));

    let start = Instant::now();
    let report = run(&cfg, gw, program.boxed());

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(report.outcome, RunOutcome::CleanStop);
    assert_eq!(report.on_stop, HookOutcome::TimedOut { timeout_ms: 50 });
}

// ── Safe state ──────────────────────────────────────────────────────

#[test]
fn fault_leaves_every_output_at_safe_value() {
    let cfg = config("scan_period_ms = 2");
    let (gw, handle) = simulation(&cfg);
    let (program, _tally) = Scripted::new();

    run(&cfg, gw, program.fail_at(4).boxed());

    for (address, value) in &cfg.safe_state {
        assert_eq!(handle.last_written(address), Some(*value), "{address}");
    }
}

#[test]
fn applying_safe_state_twice_equals_once() {
    let cfg = config("");
    let registry = PointRegistry::from_config(&cfg.points).unwrap();
    let table = SafeStateTable::from_config(&cfg.safe_state, &registry).unwrap();
    let policy = RetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(1),
    };

    let mut gw = SimulationGateway::new(&GatewayConfig::default(), Duration::from_millis(20));
    gw.connect().unwrap();
    let handle = gw.handle();
    gw.write_point(&relay1(), Value::Bool(true)).unwrap();

    let first = table.apply(&mut gw, policy);
    let once: Vec<_> = table.entries().iter().map(|(a, _)| handle.value(a)).collect();
    let second = table.apply(&mut gw, policy);
    let twice: Vec<_> = table.entries().iter().map(|(a, _)| handle.value(a)).collect();

    assert_eq!(once, twice);
    assert_eq!(first.applied, second.applied);
    assert_eq!(handle.value(&relay1()), Some(Value::Bool(false)));
}
