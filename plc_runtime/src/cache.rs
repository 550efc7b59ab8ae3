//! IO cache: the program's view of the I/O for one scan cycle.
//!
//! Only [`IoCache::refresh`] and [`IoCache::flush`] touch the gateway.
//! Between them, reads and writes are plain memory operations, so every
//! read within one cycle sees the same snapshot.

use plc_common::gateway::{GatewayError, IoGateway};
use plc_common::io::registry::PointRegistry;
use plc_common::point::{Address, PointValue, Value, ValueType};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Cache access error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("unknown point {0}")]
    UnknownPoint(String),

    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    #[error("{0} is an input and cannot be written")]
    NotWritable(String),

    #[error("{address} expects a {expected} value")]
    TypeMismatch {
        address: String,
        expected: ValueType,
    },
}

/// Per-point failures of one gateway pass.
#[derive(Debug, Default)]
pub struct IoOutcome {
    pub ok: usize,
    pub failures: Vec<(Address, GatewayError)>,
}

impl IoOutcome {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure that is not a communication failure.
    pub fn fatal(&self) -> Option<&(Address, GatewayError)> {
        self.failures.iter().find(|(_, e)| !e.is_communication())
    }
}

pub struct IoCache {
    registry: Arc<PointRegistry>,
    inputs: Vec<Address>,
    entries: HashMap<Address, PointValue>,
    staged: BTreeMap<Address, Value>,
}

impl IoCache {
    /// Empty cache over the configured points.
    ///
    /// Inputs start `Unknown`. Outputs with an `init_value` read back that
    /// value but are not staged, so nothing is written until the program
    /// writes them.
    pub fn new(registry: Arc<PointRegistry>) -> Self {
        let inputs = registry.inputs().map(|b| b.address.clone()).collect();
        let entries = registry
            .iter()
            .map(|b| {
                let pv = match b.init_value {
                    Some(v) if b.is_output() => PointValue::fresh(b.address.clone(), v),
                    _ => PointValue::unknown(b.address.clone()),
                };
                (b.address.clone(), pv)
            })
            .collect();

        Self {
            registry,
            inputs,
            entries,
            staged: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &PointRegistry {
        &self.registry
    }

    /// Read every configured input through the gateway.
    ///
    /// A failed read keeps the last good value as stale; it never turns
    /// into a default.
    pub fn refresh(&mut self, gateway: &mut dyn IoGateway) -> IoOutcome {
        let mut outcome = IoOutcome::default();
        if self.inputs.is_empty() {
            return outcome;
        }

        let mut results = gateway.read_points(&self.inputs).into_iter();
        for address in &self.inputs {
            let result = results.next().unwrap_or_else(|| {
                Err(GatewayError::Protocol(format!("no batch result for {address}")))
            });
            let normal_closed = self
                .registry
                .get(address)
                .is_some_and(|b| b.normal_closed);

            match result {
                Ok(pv) => {
                    let pv = match pv.value() {
                        Some(Value::Bool(b)) if normal_closed => {
                            PointValue::fresh(address.clone(), Value::Bool(!b))
                        }
                        _ => pv,
                    };
                    trace!("refresh {} = {:?}", address, pv.value());
                    self.entries.insert(address.clone(), pv);
                    outcome.ok += 1;
                }
                Err(e) => {
                    if let Some(entry) = self.entries.get_mut(address) {
                        entry.mark_failed();
                    }
                    debug!("refresh {} failed: {}", address, e);
                    outcome.failures.push((address.clone(), e));
                }
            }
        }
        outcome
    }

    /// Last refreshed value of an input, or last requested value of an output.
    pub fn read(&self, address: &Address) -> Result<&PointValue, CacheError> {
        self.entries
            .get(address)
            .ok_or_else(|| CacheError::UnknownPoint(address.to_string()))
    }

    pub fn read_label(&self, label: &str) -> Result<&PointValue, CacheError> {
        let address = self.resolve(label)?;
        self.read(address)
    }

    /// Fresh boolean value of a labelled point; `None` when stale or unknown.
    pub fn bool(&self, label: &str) -> Result<Option<bool>, CacheError> {
        Ok(self.read_label(label)?.as_bool())
    }

    /// Fresh numeric value of a labelled point; `None` when stale or unknown.
    pub fn number(&self, label: &str) -> Result<Option<f64>, CacheError> {
        Ok(self.read_label(label)?.as_f64())
    }

    /// Stage an output value for the next flush.
    pub fn write(&mut self, address: &Address, value: impl Into<Value>) -> Result<(), CacheError> {
        let value = value.into();
        let binding = self
            .registry
            .get(address)
            .ok_or_else(|| CacheError::UnknownPoint(address.to_string()))?;
        if !binding.is_output() {
            return Err(CacheError::NotWritable(address.to_string()));
        }
        let value = value
            .coerce(address.value_type())
            .ok_or_else(|| CacheError::TypeMismatch {
                address: address.to_string(),
                expected: address.value_type(),
            })?;

        self.entries
            .insert(address.clone(), PointValue::fresh(address.clone(), value));
        self.staged.insert(address.clone(), value);
        Ok(())
    }

    pub fn write_label(&mut self, label: &str, value: impl Into<Value>) -> Result<(), CacheError> {
        let address = self.resolve(label)?.clone();
        self.write(&address, value)
    }

    /// Send every output staged since the last flush.
    ///
    /// Outputs whose write failed stay staged and go out with the next flush.
    pub fn flush(&mut self, gateway: &mut dyn IoGateway) -> IoOutcome {
        let mut outcome = IoOutcome::default();
        if self.staged.is_empty() {
            return outcome;
        }

        let writes: Vec<(Address, Value)> = std::mem::take(&mut self.staged).into_iter().collect();
        let mut results = gateway.write_points(&writes).into_iter();
        for (address, value) in writes {
            let result = results.next().unwrap_or_else(|| {
                Err(GatewayError::Protocol(format!("no batch result for {address}")))
            });
            match result {
                Ok(()) => {
                    trace!("flush {} = {}", address, value);
                    outcome.ok += 1;
                }
                Err(e) => {
                    debug!("flush {} failed: {}", address, e);
                    self.staged.insert(address.clone(), value);
                    outcome.failures.push((address, e));
                }
            }
        }
        outcome
    }

    #[inline]
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn is_staged(&self, address: &Address) -> bool {
        self.staged.contains_key(address)
    }

    fn resolve(&self, label: &str) -> Result<&Address, CacheError> {
        self.registry
            .resolve(label)
            .ok_or_else(|| CacheError::UnknownLabel(label.to_string()))
    }
}
