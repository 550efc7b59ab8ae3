//! Restart policy across engine runs.
//!
//! Every run gets a fresh gateway, program and engine from the `build`
//! callback; nothing carries over from a faulted run except the report.

use crate::cycle::{ScanEngine, StopSignal};
use crate::error::EngineError;
use crate::notify::Notifications;
use crate::program::ControlProgram;
use crate::report::SessionReport;
use plc_common::config::PlcConfig;
use plc_common::gateway::IoGateway;
use tracing::{error, info, warn};

/// Collaborators for one run.
pub type RunParts = (Box<dyn IoGateway>, Box<dyn ControlProgram>);

pub struct Supervisor {
    config: PlcConfig,
    stop: StopSignal,
    notifications: Option<Notifications>,
}

impl Supervisor {
    pub fn new(config: PlcConfig, stop: StopSignal) -> Self {
        Self {
            config,
            stop,
            notifications: None,
        }
    }

    /// Every run reports its fault through `notifications`.
    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn config(&self) -> &PlcConfig {
        &self.config
    }

    /// Run engines until a clean stop, a stop request, or the restart limit.
    ///
    /// `build` receives the run index (0 for the first run).
    ///
    /// # Errors
    /// Only when the first run cannot be built. A failure to build a
    /// restart ends the session with the previous (faulted) run last.
    pub fn run<F>(&self, mut build: F) -> Result<SessionReport, EngineError>
    where
        F: FnMut(u32) -> Result<RunParts, EngineError>,
    {
        let runtime = &self.config.runtime;
        let mut session = SessionReport::default();
        let mut index = 0u32;

        loop {
            let engine = match build(index).and_then(|(gateway, program)| {
                let engine = ScanEngine::new(&self.config, gateway, program, self.stop.clone())?;
                Ok(match &self.notifications {
                    Some(n) => engine.with_notifications(n.clone()),
                    None => engine,
                })
            }) {
                Ok(engine) => engine,
                Err(e) if index == 0 => return Err(e),
                Err(e) => {
                    error!("Cannot build run #{}: {}", index + 1, e);
                    break;
                }
            };

            let report = engine.run();
            let faulted = report.is_faulted();
            session.runs.push(report);

            if !faulted || !runtime.restart_on_fault {
                break;
            }
            if self.stop.is_requested() {
                info!("Stop requested, not restarting");
                break;
            }
            if session.restarts >= runtime.max_restarts {
                error!("Restart limit ({}) reached", runtime.max_restarts);
                break;
            }

            warn!(
                "Restarting in {}ms ({}/{})",
                runtime.restart_delay_ms,
                session.restarts + 1,
                runtime.max_restarts
            );
            if self.stop.sleep(runtime.restart_delay()) {
                info!("Stop requested during restart delay");
                break;
            }
            session.restarts += 1;
            index += 1;
        }

        Ok(session)
    }
}
