//! Shared fixtures: a scripted control program and a three-point plant.
//!
//! Points: `di/1_01` "sensor" (required input), `ro/1_01` "relay1",
//! `ao/1_01` "valve". Safe state: relay1 = false, valve = 2.5.

#![allow(dead_code)]

use plc_common::config::{ConfigLoader, GatewayConfig, PlcConfig};
use plc_common::io::registry::PointRegistry;
use plc_common::point::Address;
use plc_gateway::{SimulationGateway, SimulationHandle};
use plc_runtime::cache::IoCache;
use plc_runtime::program::{ControlProgram, FaultReason, ProgramError};
use plc_runtime::report::RunReport;
use plc_runtime::{ScanEngine, StopSignal};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PLANT: &str = r#"
[shared]
service_name = "integration"

[gateway]
driver = "simulation"

[program]
name = "scripted"

[[points]]
address = "di/1_01"
label = "sensor"

[[points]]
address = "ro/1_01"
label = "relay1"

[[points]]
address = "ao/1_01"
label = "valve"

[safe_state]
"ro/1_01" = false
"ao/1_01" = 2.5
"#;

pub fn sensor() -> Address {
    "di/1_01".parse().unwrap()
}

pub fn relay1() -> Address {
    "ro/1_01".parse().unwrap()
}

pub fn valve() -> Address {
    "ao/1_01".parse().unwrap()
}

/// Plant configuration with the given `[runtime]` body.
pub fn config(runtime: &str) -> PlcConfig {
    let toml = format!("[runtime]\n{runtime}\n{PLANT}");
    let config = PlcConfig::from_toml(&toml).unwrap();
    config.validate().unwrap();
    config
}

pub fn simulation(config: &PlcConfig) -> (SimulationGateway, SimulationHandle) {
    let gateway = SimulationGateway::new(&config.gateway, config.runtime.io_timeout());
    let handle = gateway.handle();
    (gateway, handle)
}

pub fn simulation_default() -> (SimulationGateway, SimulationHandle) {
    let gateway = SimulationGateway::new(&GatewayConfig::default(), Duration::from_millis(50));
    let handle = gateway.handle();
    (gateway, handle)
}

/// What a best-effort hook does when called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hook {
    Ok,
    Fail,
    Panic,
    Hang(Duration),
}

impl Hook {
    fn call(self, name: &str) -> Result<(), ProgramError> {
        match self {
            Hook::Ok => Ok(()),
            Hook::Fail => Err(ProgramError::Failed(format!("{name} failed"))),
            Hook::Panic => panic!("{name} panicked"),
            Hook::Hang(d) => {
                thread::sleep(d);
                Ok(())
            }
        }
    }
}

/// Observations shared between a test and its program.
#[derive(Clone, Default)]
pub struct Tally {
    pub started: Arc<AtomicBool>,
    pub cycles: Arc<AtomicU64>,
    pub stops: Arc<AtomicU32>,
    pub faults: Arc<Mutex<Vec<FaultReason>>>,
}

impl Tally {
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn faults(&self) -> Vec<FaultReason> {
        self.faults.lock().unwrap().clone()
    }

    /// Block until the program has run `n` cycles.
    pub fn wait_cycles(&self, n: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.cycles() >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

/// Program that energizes relay1 every cycle and misbehaves on request.
pub struct Scripted {
    tally: Tally,
    fail_at: Option<u64>,
    panic_at: Option<u64>,
    hang_at: Option<(u64, Duration)>,
    stop_at: Option<(u64, StopSignal)>,
    cycle_time: Duration,
    on_fault: Hook,
    on_stop: Hook,
}

impl Scripted {
    pub fn new() -> (Self, Tally) {
        let tally = Tally::default();
        (
            Self {
                tally: tally.clone(),
                fail_at: None,
                panic_at: None,
                hang_at: None,
                stop_at: None,
                cycle_time: Duration::ZERO,
                on_fault: Hook::Ok,
                on_stop: Hook::Ok,
            },
            tally,
        )
    }

    pub fn fail_at(mut self, cycle: u64) -> Self {
        self.fail_at = Some(cycle);
        self
    }

    pub fn panic_at(mut self, cycle: u64) -> Self {
        self.panic_at = Some(cycle);
        self
    }

    /// Block inside cycle `cycle` for `d`.
    pub fn hang_at(mut self, cycle: u64, d: Duration) -> Self {
        self.hang_at = Some((cycle, d));
        self
    }

    /// Request a stop from inside cycle `cycle`.
    pub fn stop_at(mut self, cycle: u64, stop: StopSignal) -> Self {
        self.stop_at = Some((cycle, stop));
        self
    }

    pub fn cycle_time(mut self, d: Duration) -> Self {
        self.cycle_time = d;
        self
    }

    pub fn on_fault(mut self, hook: Hook) -> Self {
        self.on_fault = hook;
        self
    }

    pub fn on_stop(mut self, hook: Hook) -> Self {
        self.on_stop = hook;
        self
    }

    pub fn boxed(self) -> Box<dyn ControlProgram> {
        Box::new(self)
    }
}

impl ControlProgram for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_start(&mut self, points: &PointRegistry) -> Result<(), ProgramError> {
        if points.resolve("relay1").is_none() {
            return Err(ProgramError::Config("relay1 missing".into()));
        }
        self.tally.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_cycle(&mut self, cache: &mut IoCache) -> Result<(), ProgramError> {
        let n = self.tally.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        cache.write_label("relay1", true)?;
        if !self.cycle_time.is_zero() {
            thread::sleep(self.cycle_time);
        }
        if let Some((at, stop)) = &self.stop_at {
            if *at == n {
                stop.request();
            }
        }
        if let Some((at, d)) = self.hang_at {
            if at == n {
                thread::sleep(d);
            }
        }
        if self.panic_at == Some(n) {
            panic!("scripted panic in cycle {n}");
        }
        if self.fail_at == Some(n) {
            return Err(ProgramError::Failed(format!("scripted failure in cycle {n}")));
        }
        Ok(())
    }

    fn on_fault(&mut self, reason: &FaultReason) -> Result<(), ProgramError> {
        self.tally.faults.lock().unwrap().push(reason.clone());
        self.on_fault.call("on_fault")
    }

    fn on_stop(&mut self) -> Result<(), ProgramError> {
        self.tally.stops.fetch_add(1, Ordering::SeqCst);
        self.on_stop.call("on_stop")
    }
}

/// Build an engine over `gateway` and run it to completion.
pub fn run(
    config: &PlcConfig,
    gateway: SimulationGateway,
    program: Box<dyn ControlProgram>,
) -> RunReport {
    ScanEngine::new(config, Box::new(gateway), program, StopSignal::new())
        .unwrap()
        .run()
}

/// Run an engine on its own thread.
pub fn spawn(
    config: &PlcConfig,
    gateway: SimulationGateway,
    program: Box<dyn ControlProgram>,
    stop: StopSignal,
) -> JoinHandle<RunReport> {
    let engine = ScanEngine::new(config, Box::new(gateway), program, stop).unwrap();
    thread::spawn(move || engine.run())
}

/// Block until `address` was last written with `value`.
pub fn wait_written(
    handle: &SimulationHandle,
    address: &Address,
    value: plc_common::point::Value,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if handle.last_written(address) == Some(value) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}
