//! Integration test: fault notifications.
//!
//! A faulted run hands exactly one message to the notifier, after the safe
//! state is on the outputs. Clean stops send nothing.

use super::common::*;
use plc_common::gateway::IoGateway;
use plc_common::point::Value;
use plc_gateway::{SimulationGateway, SimulationHandle};
use plc_runtime::StopSignal;
use plc_runtime::notify::{Notifications, Notifier, NotifyError};
use plc_runtime::report::RunOutcome;
use plc_runtime::{ScanEngine, Supervisor};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records each message with relay1's last written value at send time.
struct RelayWitness {
    handle: SimulationHandle,
    failures_left: Mutex<u32>,
    sent: Mutex<Vec<(String, Option<Value>)>>,
}

impl RelayWitness {
    fn new(handle: SimulationHandle, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            handle,
            failures_left: Mutex::new(failures),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<(String, Option<Value>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RelayWitness {
    fn name(&self) -> &str {
        "relay-witness"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(NotifyError::Delivery("mailbox busy".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((message.to_string(), self.handle.last_written(&relay1())));
        Ok(())
    }
}

fn notifications(witness: &Arc<RelayWitness>) -> Notifications {
    Notifications::new(witness.clone(), 3, Duration::from_millis(1))
}

#[test]
fn fault_sends_one_message_after_safe_state() {
    let cfg = config("scan_period_ms = 2");
    let (gw, handle) = simulation(&cfg);
    let witness = RelayWitness::new(handle.clone(), 1);
    let alerts = notifications(&witness);
    let (program, _tally) = Scripted::new();

    let program = program.fail_at(3).boxed();
    let report = ScanEngine::new(&cfg, Box::new(gw), program, StopSignal::new())
        .unwrap()
        .with_notifications(alerts.clone())
        .run();
    assert!(report.is_faulted());
    assert_eq!(alerts.wait(Duration::from_secs(2)), 0);

    let sent = witness.sent();
    assert_eq!(sent.len(), 1);
    let (message, relay_at_send) = &sent[0];
    assert!(message.contains("'scripted' interrupted"));
    assert!(message.contains("scripted failure in cycle 3"));
    assert!(message.contains("2 output(s) applied"));
    assert_eq!(*relay_at_send, Some(Value::Bool(false)));
}

#[test]
fn clean_stop_sends_nothing() {
    let cfg = config("scan_period_ms = 2\nmax_cycles = 3");
    let (gw, handle) = simulation(&cfg);
    let witness = RelayWitness::new(handle, 0);
    let alerts = notifications(&witness);
    let (program, _tally) = Scripted::new();

    let report = ScanEngine::new(&cfg, Box::new(gw), program.boxed(), StopSignal::new())
        .unwrap()
        .with_notifications(alerts.clone())
        .run();

    assert_eq!(report.outcome, RunOutcome::CleanStop);
    assert_eq!(alerts.wait(Duration::from_secs(1)), 0);
    assert!(witness.sent().is_empty());
}

#[test]
fn every_faulted_restart_is_reported() {
    let cfg = config(
        "scan_period_ms = 2\nrestart_on_fault = true\nmax_restarts = 2\nrestart_delay_ms = 1",
    );
    let (_seed, handle) = simulation(&cfg);
    let witness = RelayWitness::new(handle.clone(), 0);
    let alerts = notifications(&witness);

    let session = Supervisor::new(cfg.clone(), StopSignal::new())
        .with_notifications(alerts.clone())
        .run(|_| {
            let gateway: Box<dyn IoGateway> = Box::new(SimulationGateway::from_handle(
                &handle,
                cfg.runtime.io_timeout(),
            ));
            let (program, _tally) = Scripted::new();
            Ok((gateway, program.fail_at(1).boxed()))
        })
        .unwrap();

    assert_eq!(session.runs.len(), 3);
    assert_eq!(alerts.wait(Duration::from_secs(2)), 0);
    assert_eq!(witness.sent().len(), 3);
}
