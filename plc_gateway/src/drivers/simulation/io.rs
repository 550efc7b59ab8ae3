//! In-memory I/O image for the simulation driver.
//!
//! The `IoSimulator` manages:
//! - The current raw value of every simulated channel
//! - Linked reactions (an output change drives an input after a delay)

use plc_common::config::{LinkedInput, SimulationConfig};
use plc_common::point::{Address, Value, ValueType};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Pending input change queued by a linked reaction.
#[derive(Debug, Clone)]
struct PendingInputChange {
    /// When this change should be applied
    trigger_time: Instant,
    input: Address,
    value: Value,
}

/// Simulated channel image.
pub struct IoSimulator {
    image: HashMap<Address, Value>,
    /// Linked reactions keyed by the driving output
    links: HashMap<Address, Vec<LinkedInput>>,
    pending: VecDeque<PendingInputChange>,
}

impl IoSimulator {
    pub fn new(config: &SimulationConfig) -> Self {
        let mut image = HashMap::new();
        for (address, value) in &config.initial {
            match value.coerce(address.value_type()) {
                Some(v) => {
                    image.insert(address.clone(), v);
                }
                None => warn!(
                    "Ignoring initial value {} for {}: expected {}",
                    value,
                    address,
                    address.value_type()
                ),
            }
        }

        let mut links: HashMap<Address, Vec<LinkedInput>> = HashMap::new();
        for link in &config.links {
            links.entry(link.output.clone()).or_default().push(link.clone());
        }

        debug!(
            "IoSimulator initialized: {} preset channels, {} linked inputs",
            image.len(),
            config.links.len()
        );

        Self {
            image,
            links,
            pending: VecDeque::new(),
        }
    }

    /// Current value of a channel after applying due reactions.
    ///
    /// Channels never written read as off / zero.
    pub fn read(&mut self, address: &Address, now: Instant) -> Value {
        self.process_pending(now);
        self.get(address)
            .unwrap_or_else(|| default_value(address.value_type()))
    }

    /// Store an output value and queue linked reactions on a change.
    pub fn write(&mut self, address: &Address, value: Value, now: Instant) {
        let prev = self.image.insert(address.clone(), value);
        if prev != Some(value) {
            self.handle_output_change(address, value, now);
        }
    }

    /// Force a channel value, bypassing reactions.
    pub fn set(&mut self, address: &Address, value: Value) {
        self.image.insert(address.clone(), value);
    }

    pub fn get(&self, address: &Address) -> Option<Value> {
        self.image.get(address).copied()
    }

    fn handle_output_change(&mut self, output: &Address, value: Value, now: Instant) {
        let Some(links) = self.links.get(output) else {
            return;
        };

        for link in links {
            let follow = follow_value(value, link.input.value_type(), link.invert);
            trace!(
                "{} -> {} queued {} = {} in {}ms",
                output,
                value,
                link.input,
                follow,
                link.delay_ms
            );
            self.pending.push_back(PendingInputChange {
                trigger_time: now + Duration::from_millis(link.delay_ms),
                input: link.input.clone(),
                value: follow,
            });
        }
    }

    /// Apply every queued change whose time has arrived, in queue order.
    fn process_pending(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].trigger_time > now {
                i += 1;
                continue;
            }
            if let Some(change) = self.pending.remove(i) {
                let old = self.image.insert(change.input.clone(), change.value);
                if old != Some(change.value) {
                    debug!("{} changed: {:?} -> {}", change.input, old, change.value);
                }
            }
        }
    }
}

fn default_value(ty: ValueType) -> Value {
    match ty {
        ValueType::Boolean => Value::Bool(false),
        ValueType::Numeric => Value::Number(0.0),
    }
}

/// Value an input takes when it follows `value`.
fn follow_value(value: Value, ty: ValueType, invert: bool) -> Value {
    let on = match value {
        Value::Bool(b) => b,
        Value::Number(n) => n != 0.0,
    };
    match (ty, value) {
        (ValueType::Numeric, Value::Number(n)) if !invert => Value::Number(n),
        (ValueType::Numeric, _) => Value::Number(if on != invert { 1.0 } else { 0.0 }),
        (ValueType::Boolean, _) => Value::Bool(on != invert),
    }
}
