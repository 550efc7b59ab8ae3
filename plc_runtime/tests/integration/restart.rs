//! Integration test: restart policy.

use super::common::*;
use plc_common::gateway::IoGateway;
use plc_common::point::Value;
use plc_gateway::SimulationGateway;
use plc_runtime::program::ControlProgram;
use plc_runtime::report::{EXIT_CLEAN, EXIT_FAULTED};
use plc_runtime::{StopSignal, Supervisor};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn restart_builds_fresh_program_and_gateway() {
    let cfg = config(
        "scan_period_ms = 2\nmax_cycles = 4\nrestart_on_fault = true\nmax_restarts = 3\nrestart_delay_ms = 5",
    );
    let (_seed, handle) = simulation(&cfg);
    let mut tallies = Vec::new();

    let session = Supervisor::new(cfg.clone(), StopSignal::new())
        .run(|index| {
            let gateway: Box<dyn IoGateway> = Box::new(SimulationGateway::from_handle(
                &handle,
                cfg.runtime.io_timeout(),
            ));
            let (program, tally) = Scripted::new();
            tallies.push(tally);
            // only the first run misbehaves
            let program: Box<dyn ControlProgram> = if index == 0 {
                program.fail_at(2).boxed()
            } else {
                program.boxed()
            };
            Ok((gateway, program))
        })
        .unwrap();

    assert_eq!(session.runs.len(), 2);
    assert_eq!(session.restarts, 1);
    assert!(session.runs[0].is_faulted());
    assert_eq!(session.runs[1].cycles, 4);
    assert_eq!(session.exit_code(), EXIT_CLEAN);

    // per-run state is not shared between instances
    assert_eq!(tallies[0].cycles(), 2);
    assert_eq!(tallies[1].cycles(), 4);
    assert_eq!(tallies[1].faults().len(), 0);
    assert_eq!(handle.last_written(&relay1()), Some(Value::Bool(false)));
}

#[test]
fn restart_limit_ends_faulted() {
    let cfg = config(
        "scan_period_ms = 2\nrestart_on_fault = true\nmax_restarts = 2\nrestart_delay_ms = 1",
    );

    let session = Supervisor::new(cfg.clone(), StopSignal::new())
        .run(|_| {
            let (gw, _handle) = simulation(&cfg);
            let (program, _tally) = Scripted::new();
            let gateway: Box<dyn IoGateway> = Box::new(gw);
            Ok((gateway, program.fail_at(1).boxed()))
        })
        .unwrap();

    assert_eq!(session.runs.len(), 3);
    assert_eq!(session.restarts, 2);
    assert_eq!(session.exit_code(), EXIT_FAULTED);
}

#[test]
fn stop_during_restart_delay_ends_session() {
    let cfg = config(
        "scan_period_ms = 2\nrestart_on_fault = true\nmax_restarts = 5\nrestart_delay_ms = 10000",
    );
    let stop = StopSignal::new();
    let remote = stop.clone();
    let waker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        remote.request();
    });

    let start = Instant::now();
    let session = Supervisor::new(cfg.clone(), stop)
        .run(|_| {
            let (gw, _handle) = simulation(&cfg);
            let (program, _tally) = Scripted::new();
            let gateway: Box<dyn IoGateway> = Box::new(gw);
            Ok((gateway, program.fail_at(1).boxed()))
        })
        .unwrap();
    waker.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(session.runs.len(), 1);
    assert_eq!(session.restarts, 0);
    assert_eq!(session.exit_code(), EXIT_FAULTED);
}

#[test]
fn no_restart_after_clean_stop() {
    let cfg = config("scan_period_ms = 2\nmax_cycles = 2\nrestart_on_fault = true");
    let mut builds = 0;

    let session = Supervisor::new(cfg.clone(), StopSignal::new())
        .run(|_| {
            builds += 1;
            let (gw, _handle) = simulation(&cfg);
            let (program, _tally) = Scripted::new();
            let gateway: Box<dyn IoGateway> = Box::new(gw);
            Ok((gateway, program.boxed()))
        })
        .unwrap();

    assert_eq!(builds, 1);
    assert_eq!(session.exit_code(), EXIT_CLEAN);
}
