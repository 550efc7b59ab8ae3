//! Safe-state table.
//!
//! Output address → value enforced on fault and on shutdown, regardless of
//! what the program last requested. Validated once against the point
//! registry and immutable afterwards.

use plc_common::gateway::{GatewayError, IoGateway};
use plc_common::io::registry::PointRegistry;
use plc_common::point::{Address, Value, ValueType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SafeStateError {
    #[error("output {0} has no safe-state entry")]
    MissingOutput(String),

    #[error("safe-state entry {0} is not a configured output")]
    NotAnOutput(String),

    #[error("safe-state value for {address} must be {expected}")]
    TypeMismatch {
        address: String,
        expected: ValueType,
    },
}

/// Bounded retries for safe-state writes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per output, including the first.
    pub attempts: u32,
    pub backoff: Duration,
}

/// An output the safe state could not be confirmed for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedWrite {
    pub address: String,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of one safe-state application.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SafeStateReport {
    pub applied: Vec<String>,
    pub failed: Vec<FailedWrite>,
    /// Written as one all-or-nothing batch.
    pub atomic: bool,
    pub duration_ms: f64,
}

impl SafeStateReport {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct PendingWrite<'a> {
    address: &'a Address,
    value: Value,
    error: GatewayError,
    attempts: u32,
}

impl<'a> PendingWrite<'a> {
    fn new(address: &'a Address, value: Value, error: GatewayError) -> Self {
        Self {
            address,
            value,
            error,
            attempts: 1,
        }
    }

    /// Only communication failures can clear on a retry.
    fn retryable(&self) -> bool {
        self.error.is_communication()
    }
}

#[derive(Debug, Clone)]
pub struct SafeStateTable {
    entries: Vec<(Address, Value)>,
}

impl SafeStateTable {
    /// Validate `table` against the configured points.
    ///
    /// Every configured output needs an entry, every entry must be a
    /// configured output, and value types must match.
    pub fn from_config(
        table: &BTreeMap<Address, Value>,
        registry: &PointRegistry,
    ) -> Result<Self, SafeStateError> {
        for (address, _) in table {
            match registry.get(address) {
                Some(b) if b.is_output() => {}
                _ => return Err(SafeStateError::NotAnOutput(address.to_string())),
            }
        }

        let mut entries = Vec::with_capacity(table.len());
        for binding in registry.outputs() {
            let address = &binding.address;
            let value = table
                .get(address)
                .ok_or_else(|| SafeStateError::MissingOutput(address.to_string()))?;
            let value = value
                .coerce(address.value_type())
                .ok_or_else(|| SafeStateError::TypeMismatch {
                    address: address.to_string(),
                    expected: address.value_type(),
                })?;
            entries.push((address.clone(), value));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(Address, Value)] {
        &self.entries
    }

    pub fn get(&self, address: &Address) -> Option<Value> {
        self.entries
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, v)| *v)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drive every output to its safe value.
    ///
    /// One batch write first; outputs that failed with a communication error
    /// are then retried one by one until `policy.attempts` is used up. A
    /// gateway with atomic batches gets the whole batch retried instead, so
    /// the outputs never disagree. Never loops beyond the policy and never
    /// fails: the report lists what could not be confirmed.
    pub fn apply(&self, gateway: &mut dyn IoGateway, policy: RetryPolicy) -> SafeStateReport {
        let start = Instant::now();
        let mut report = SafeStateReport::default();
        if self.entries.is_empty() {
            return report;
        }

        if gateway.supports_atomic_batch() {
            info!(
                "Applying safe state to {} output(s) as one atomic batch",
                self.entries.len()
            );
            report.atomic = true;
            self.apply_atomic(gateway, policy, &mut report);
            report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            return report;
        }

        info!("Applying safe state to {} output(s)", self.entries.len());

        let results = gateway.write_points(&self.entries);
        let mut pending: Vec<PendingWrite<'_>> = Vec::new();
        for (i, (address, value)) in self.entries.iter().enumerate() {
            match results.get(i) {
                Some(Ok(())) => report.applied.push(address.to_string()),
                Some(Err(e)) => pending.push(PendingWrite::new(address, *value, e.clone())),
                None => pending.push(PendingWrite::new(
                    address,
                    *value,
                    GatewayError::Protocol("no batch result".to_string()),
                )),
            }
        }

        let mut round = 1;
        while round < policy.attempts && pending.iter().any(PendingWrite::retryable) {
            round += 1;
            thread::sleep(policy.backoff);

            let mut still_failing = Vec::new();
            for mut p in pending {
                if !p.retryable() {
                    still_failing.push(p);
                    continue;
                }
                p.attempts += 1;
                match gateway.write_point(p.address, p.value) {
                    Ok(()) => {
                        debug!("Safe state {} = {} on attempt {}", p.address, p.value, p.attempts);
                        report.applied.push(p.address.to_string());
                    }
                    Err(e) => {
                        warn!("Safe state {} attempt {} failed: {}", p.address, p.attempts, e);
                        p.error = e;
                        still_failing.push(p);
                    }
                }
            }
            pending = still_failing;
        }

        for p in pending {
            error!("Safe state NOT confirmed for {}: {}", p.address, p.error);
            report.failed.push(FailedWrite {
                address: p.address.to_string(),
                attempts: p.attempts,
                error: p.error.to_string(),
            });
        }

        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        report
    }

    fn apply_atomic(
        &self,
        gateway: &mut dyn IoGateway,
        policy: RetryPolicy,
        report: &mut SafeStateReport,
    ) {
        let mut attempts = 0;
        let error = loop {
            attempts += 1;
            let results = gateway.write_points(&self.entries);
            let error = if results.len() == self.entries.len() {
                results.into_iter().find_map(Result::err)
            } else {
                Some(GatewayError::Protocol("no batch result".to_string()))
            };
            let Some(error) = error else {
                debug!("Safe state batch confirmed on attempt {}", attempts);
                report.applied = self.entries.iter().map(|(a, _)| a.to_string()).collect();
                return;
            };
            warn!("Safe state batch attempt {} failed: {}", attempts, error);
            if attempts >= policy.attempts || !error.is_communication() {
                break error;
            }
            thread::sleep(policy.backoff);
        };

        error!("Safe state NOT confirmed for any output: {}", error);
        report.failed = self
            .entries
            .iter()
            .map(|(address, _)| FailedWrite {
                address: address.to_string(),
                attempts,
                error: error.to_string(),
            })
            .collect();
    }
}
