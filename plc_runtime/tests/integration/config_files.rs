//! Integration test: shipped sample configurations.
//!
//! Each file under `config/` must load, validate, build its program from
//! the built-in registry and run against the simulation driver.

use plc_common::config::{ConfigError, ConfigLoader, PlcConfig};
use plc_common::point::{Address, Value};
use plc_gateway::SimulationGateway;
use plc_runtime::error::EngineError;
use plc_runtime::programs::ProgramRegistry;
use plc_runtime::report::{RunOutcome, RunReport};
use plc_runtime::{ScanEngine, StopSignal};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const LAMP: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/lamp.toml");
const VALVE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/valve.toml");

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn load(path: &str, cycles: u64) -> PlcConfig {
    let mut config = PlcConfig::load(Path::new(path)).unwrap();
    config.validate().unwrap();
    config.runtime.scan_period_ms = 5;
    config.runtime.max_cycles = Some(cycles);
    config
}

fn run_simulated(
    config: &PlcConfig,
    prepare: impl FnOnce(&plc_gateway::SimulationHandle),
) -> (RunReport, plc_gateway::SimulationHandle) {
    let gateway = SimulationGateway::new(&config.gateway, config.runtime.io_timeout());
    let handle = gateway.handle();
    prepare(&handle);
    let program = ProgramRegistry::with_builtin()
        .create(&config.program)
        .unwrap();
    let report = ScanEngine::new(config, Box::new(gateway), program, StopSignal::new())
        .unwrap()
        .run();
    (report, handle)
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn lamp_config_toggles_lamp() {
    let config = load(LAMP, 4);
    assert_eq!(config.program.name, "pushbutton_lamp");
    assert_eq!(config.gateway.simulation.links.len(), 1);

    let (report, handle) = run_simulated(&config, |h| h.set_input(&addr("di/1_01"), true));

    assert_eq!(report.outcome, RunOutcome::CleanStop);
    assert_eq!(report.cycles, 4);
    assert_eq!(report.program, "pushbutton_lamp");
    assert!(handle.writes().contains(&(addr("ro/1_01"), Value::Bool(true))));
    assert_eq!(handle.last_written(&addr("ro/1_01")), Some(Value::Bool(false)));
}

#[test]
fn valve_config_runs_sequence() {
    let config = load(VALVE, 3);

    let (report, handle) = run_simulated(&config, |_| {});

    assert_eq!(report.outcome, RunOutcome::CleanStop);
    assert!(handle.writes().contains(&(addr("ao/1_01"), Value::Number(10.0))));
    assert_eq!(handle.last_written(&addr("ao/1_01")), Some(Value::Number(10.0)));
}

#[test]
fn valve_config_faults_on_open_estop_loop() {
    let config = load(VALVE, 50);

    // normally closed loop reads open: e-stop active
    let (report, handle) = run_simulated(&config, |h| h.set_input(&addr("di/1_05"), false));

    assert!(report.is_faulted());
    let is_emergency = matches!(
        report.cause(),
        Some(EngineError::LogicFailure { message }) if message.contains("emergency")
    );
    assert!(is_emergency);
    assert_eq!(handle.last_written(&addr("ao/1_01")), Some(Value::Number(10.0)));
}

#[test]
fn missing_file_is_reported() {
    let result = PlcConfig::load(Path::new("/nonexistent/plc.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn duplicate_address_fails_validation() {
    let file = write_temp(
        r#"
[shared]
service_name = "dup"

[program]
name = "pushbutton_lamp"

[[points]]
address = "di/1_01"
label = "pushbutton"

[[points]]
address = "di/1_01"
label = "other"
"#,
    );
    let config = PlcConfig::load(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn safe_state_on_input_is_a_configuration_error() {
    let file = write_temp(
        r#"
[shared]
service_name = "bad-safe-state"

[program]
name = "pushbutton_lamp"

[[points]]
address = "di/1_01"
label = "pushbutton"

[[points]]
address = "ro/1_01"
label = "lamp"

[safe_state]
"di/1_01" = false
"#,
    );
    let config = PlcConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    let gateway = SimulationGateway::new(&config.gateway, config.runtime.io_timeout());
    let program = ProgramRegistry::with_builtin()
        .create(&config.program)
        .unwrap();
    let result = ScanEngine::new(&config, Box::new(gateway), program, StopSignal::new());
    assert!(matches!(result, Err(EngineError::Configuration { .. })));
}

#[test]
fn unknown_program_lists_builtins() {
    let mut config = load(LAMP, 1);
    config.program.name = "conveyor".to_string();
    let err = ProgramRegistry::with_builtin()
        .create(&config.program)
        .err()
        .unwrap();
    let message = err.to_string();
    assert!(message.contains("pushbutton_lamp"));
    assert!(message.contains("valve_sequencer"));
}
