//! Simulation driver.
//!
//! Software stand-in for the Evok service. The gateway shares its state
//! with any number of [`SimulationHandle`]s, which tests and the operator
//! use to drive inputs, inject failures and inspect the I/O log.

mod io;

pub use io::IoSimulator;

use parking_lot::Mutex;
use plc_common::config::GatewayConfig;
use plc_common::gateway::GatewayDiagnostics;
use plc_common::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Factory function registered as `"simulation"`.
pub fn create_gateway(
    config: &GatewayConfig,
    timeout: Duration,
) -> Result<Box<dyn IoGateway>, GatewayError> {
    Ok(Box::new(SimulationGateway::new(config, timeout)))
}

// ─── I/O Log ────────────────────────────────────────────────────────

/// Kind of gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

/// One gateway call as seen by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct IoEvent {
    pub at: Instant,
    pub op: IoOp,
    pub address: Address,
    /// Value read or written; `None` when the call failed.
    pub value: Option<Value>,
}

impl IoEvent {
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }
}

// ─── Shared State ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct InjectedFault {
    error: GatewayError,
    /// Calls left before the fault clears; `None` = until cleared.
    remaining: Option<u32>,
}

struct SimState {
    io: IoSimulator,
    faults: HashMap<Address, InjectedFault>,
    unreachable: bool,
    latency: Duration,
    connected: bool,
    /// Most recent calls, oldest first, at most `log_capacity` long.
    log: VecDeque<IoEvent>,
    log_capacity: usize,
    /// Last successful write per output, kept regardless of log eviction.
    written: HashMap<Address, Value>,
    diagnostics: GatewayDiagnostics,
}

impl SimState {
    /// Failure to report for this call, consuming one use of a counted fault.
    fn take_fault(&mut self, address: &Address) -> Option<GatewayError> {
        if self.unreachable {
            return Some(GatewayError::Unreachable(
                "simulated service offline".to_string(),
            ));
        }
        let fault = self.faults.get_mut(address)?;
        let error = fault.error.clone();
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.faults.remove(address);
            }
        }
        Some(error)
    }

    fn record(&mut self, op: IoOp, address: &Address, value: Option<Value>) {
        match op {
            IoOp::Read => self.diagnostics.reads += 1,
            IoOp::Write => self.diagnostics.writes += 1,
        }
        match value {
            None => self.diagnostics.failures += 1,
            Some(v) if op == IoOp::Write => {
                self.written.insert(address.clone(), v);
            }
            Some(_) => {}
        }
        if self.log_capacity == 0 {
            return;
        }
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(IoEvent {
            at: Instant::now(),
            op,
            address: address.clone(),
            value,
        });
    }
}

// ─── SimulationGateway ──────────────────────────────────────────────

/// In-memory gateway.
pub struct SimulationGateway {
    state: Arc<Mutex<SimState>>,
    timeout: Duration,
}

impl SimulationGateway {
    pub fn new(config: &GatewayConfig, timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                io: IoSimulator::new(&config.simulation),
                faults: HashMap::new(),
                unreachable: false,
                latency: Duration::ZERO,
                connected: false,
                log: VecDeque::new(),
                log_capacity: config.simulation.log_capacity,
                written: HashMap::new(),
                diagnostics: GatewayDiagnostics::default(),
            })),
            timeout,
        }
    }

    /// A second gateway over the same simulated image.
    ///
    /// Used to hand a fresh gateway to each run of a restart loop while
    /// tests keep observing the same channels.
    pub fn from_handle(handle: &SimulationHandle, timeout: Duration) -> Self {
        Self {
            state: Arc::clone(&handle.state),
            timeout,
        }
    }

    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Sleep for the simulated latency, bounded by the call timeout.
    fn simulate_latency(&self, address: &Address) -> Result<(), GatewayError> {
        let latency = self.state.lock().latency;
        if latency.is_zero() {
            return Ok(());
        }
        thread::sleep(latency.min(self.timeout));
        if latency > self.timeout {
            self.state.lock().diagnostics.timeouts += 1;
            return Err(GatewayError::Timeout {
                address: address.to_string(),
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

impl IoGateway for SimulationGateway {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn connect(&mut self) -> Result<(), GatewayError> {
        let mut st = self.state.lock();
        if st.unreachable {
            return Err(GatewayError::Unreachable(
                "simulated service offline".to_string(),
            ));
        }
        st.connected = true;
        info!("Simulation gateway connected");
        Ok(())
    }

    fn read_point(&mut self, address: &Address) -> Result<PointValue, GatewayError> {
        if let Err(e) = self.simulate_latency(address) {
            self.state.lock().record(IoOp::Read, address, None);
            return Err(e);
        }

        let mut st = self.state.lock();
        if !st.connected {
            st.record(IoOp::Read, address, None);
            return Err(GatewayError::Unreachable("not connected".to_string()));
        }
        if let Some(error) = st.take_fault(address) {
            st.record(IoOp::Read, address, None);
            return Err(error);
        }

        let value = st.io.read(address, Instant::now());
        st.record(IoOp::Read, address, Some(value));
        Ok(PointValue::fresh(address.clone(), value))
    }

    fn write_point(&mut self, address: &Address, value: Value) -> Result<(), GatewayError> {
        if let Err(e) = self.simulate_latency(address) {
            self.state.lock().record(IoOp::Write, address, None);
            return Err(e);
        }

        let mut st = self.state.lock();
        if !st.connected {
            st.record(IoOp::Write, address, None);
            return Err(GatewayError::Unreachable("not connected".to_string()));
        }
        if let Some(error) = st.take_fault(address) {
            st.record(IoOp::Write, address, None);
            return Err(error);
        }
        if !address.is_output() {
            st.record(IoOp::Write, address, None);
            return Err(GatewayError::InvalidAddress(format!(
                "{address} is not writable"
            )));
        }
        let Some(value) = value.coerce(address.value_type()) else {
            st.record(IoOp::Write, address, None);
            return Err(GatewayError::Protocol(format!(
                "{address} rejects value {value}"
            )));
        };

        st.io.write(address, value, Instant::now());
        st.record(IoOp::Write, address, Some(value));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), GatewayError> {
        self.state.lock().connected = false;
        debug!("Simulation gateway disconnected");
        Ok(())
    }

    fn diagnostics(&self) -> Option<GatewayDiagnostics> {
        Some(self.state.lock().diagnostics.clone())
    }
}

// ─── SimulationHandle ───────────────────────────────────────────────

/// Shared control surface of a simulated image.
#[derive(Clone)]
pub struct SimulationHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulationHandle {
    /// Set the raw value of a channel.
    pub fn set_input(&self, address: &Address, value: impl Into<Value>) {
        self.state.lock().io.set(address, value.into());
    }

    /// Current raw value of a channel.
    pub fn value(&self, address: &Address) -> Option<Value> {
        self.state.lock().io.get(address)
    }

    /// Fail every call on `address` until [`clear_failure`](Self::clear_failure).
    pub fn fail_point(&self, address: &Address, error: GatewayError) {
        self.state.lock().faults.insert(
            address.clone(),
            InjectedFault {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `count` calls on `address`.
    pub fn fail_point_times(&self, address: &Address, error: GatewayError, count: u32) {
        if count == 0 {
            return;
        }
        self.state.lock().faults.insert(
            address.clone(),
            InjectedFault {
                error,
                remaining: Some(count),
            },
        );
    }

    pub fn clear_failure(&self, address: &Address) {
        self.state.lock().faults.remove(address);
    }

    /// Take the whole simulated service offline (or back online).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay every call by `latency`. Calls slower than the timeout fail.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Retained calls, oldest first.
    pub fn events(&self) -> Vec<IoEvent> {
        self.state.lock().log.iter().cloned().collect()
    }

    /// Retained successful writes, in order.
    pub fn writes(&self) -> Vec<(Address, Value)> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|e| e.op == IoOp::Write)
            .filter_map(|e| e.value.map(|v| (e.address.clone(), v)))
            .collect()
    }

    /// Last successfully written value of an output.
    pub fn last_written(&self, address: &Address) -> Option<Value> {
        self.state.lock().written.get(address).copied()
    }

    /// Drop the retained events and the last-written values.
    pub fn clear_events(&self) {
        let mut st = self.state.lock();
        st.log.clear();
        st.written.clear();
    }
}
