//! # PLC Runtime Binary
//!
//! Runs one control program against the configured I/O gateway until a
//! termination signal, the cycle limit, or a fault.
//!
//! # Usage
//!
//! ```bash
//! # Run against the Evok REST service
//! plc_runtime --config /etc/plc/plc.toml
//!
//! # Develop without hardware
//! plc_runtime --config config/lamp.toml --simulate -v
//!
//! # Keep a JSON report of the run
//! plc_runtime --config config/valve.toml --report /tmp/plc-report.json
//! ```
//!
//! Exit codes: 0 clean stop, 1 faulted, 2 could not start.

use clap::Parser;
use plc_common::config::{ConfigLoader, PlcConfig};
use plc_common::consts::DEFAULT_CONFIG_PATH;
use plc_gateway::default_registry;
use plc_runtime::error::EngineError;
use plc_runtime::notify::Notifications;
use plc_runtime::programs::ProgramRegistry;
use plc_runtime::report::{EXIT_STARTUP, SessionReport};
use plc_runtime::{StopSignal, Supervisor};
use std::path::{Path, PathBuf};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Soft-PLC runtime - cyclic scan engine with safe-state enforcement
#[derive(Parser, Debug)]
#[command(name = "plc_runtime")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Soft-PLC scan engine for network-attached I/O")]
#[command(long_about = None)]
struct Args {
    /// Path to the PLC configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run this program instead of the one in the configuration.
    #[arg(short, long)]
    program: Option<String>,

    /// Force the simulation gateway driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Write the final JSON report to this file.
    #[arg(short, long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("PLC startup failed: {}", e);
            EXIT_STARTUP
        }
    };
    std::process::exit(code);
}

fn run(args: &Args) -> Result<i32, Box<dyn std::error::Error>> {
    let loaded = load_config(args);

    let level = match (&loaded, args.verbose) {
        (_, true) => Level::DEBUG,
        (Ok(config), false) => config.shared.log_level.into(),
        (Err(_), false) => Level::INFO,
    };
    setup_tracing(level, args.json);

    let config = loaded?;
    info!(
        "PLC runtime v{} starting: service={}, program={}, driver={}",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name,
        config.program.name,
        config.gateway.driver
    );

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_stop.request();
    })?;

    let notifications = match &config.notification {
        Some(n) => {
            info!("Fault notifications to {} via {}", n.recipient, n.smtp_server);
            Some((Notifications::from_config(n)?, n.delivery_bound()))
        }
        None => None,
    };

    let gateways = default_registry();
    let programs = ProgramRegistry::with_builtin();
    let io_timeout = config.runtime.io_timeout();
    let gateway_config = config.gateway.clone();
    let program_config = config.program.clone();

    let mut supervisor = Supervisor::new(config, stop);
    if let Some((n, _)) = &notifications {
        supervisor = supervisor.with_notifications(n.clone());
    }
    let session = supervisor.run(|index| {
        if index > 0 {
            info!("Building run #{}", index + 1);
        }
        let gateway = gateways
            .create(&gateway_config, io_timeout)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        let program = programs
            .create(&program_config)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        Ok((gateway, program))
    })?;

    if let Some(path) = &args.report {
        if let Err(e) = write_report(path, &session) {
            warn!("Cannot write report to {}: {}", path.display(), e);
        }
    }

    if let Some((n, bound)) = &notifications {
        let left = n.wait(*bound);
        if left > 0 {
            warn!("{} fault notification(s) still undelivered at exit", left);
        }
    }

    let code = session.exit_code();
    match session.last().and_then(|r| r.cause()) {
        Some(cause) => error!("PLC stopped after fault: {} (exit {})", cause, code),
        None => info!("PLC stopped cleanly (exit {})", code),
    }
    Ok(code)
}

/// Load the file, apply CLI overrides, validate.
fn load_config(args: &Args) -> Result<PlcConfig, Box<dyn std::error::Error>> {
    let mut config = PlcConfig::load(&args.config)
        .map_err(|e| format!("{}: {e}", args.config.display()))?;
    if let Some(name) = &args.program {
        config.program.name = name.clone();
    }
    if args.simulate {
        config.gateway.driver = "simulation".to_string();
    }
    config.validate()?;
    Ok(config)
}

fn write_report(path: &Path, session: &SessionReport) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, json)?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Setup tracing subscriber; `RUST_LOG` directives still apply.
fn setup_tracing(level: Level, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
