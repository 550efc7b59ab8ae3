//! I/O gateway trait and error types.
//!
//! This module defines:
//! - `IoGateway` trait - Interface for pluggable I/O service clients
//! - `GatewayError` enum - Typed failures for gateway calls
//! - `GatewayFactory` type alias - Factory function type
//! - `GatewayDiagnostics` struct - Optional call counters

use crate::config::GatewayConfig;
use crate::point::{Address, PointValue, Value};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Error types for gateway operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The call did not complete within the per-call timeout.
    #[error("timeout after {timeout:?} on {address}")]
    Timeout { address: String, timeout: Duration },

    /// The I/O service could not be reached.
    #[error("I/O service unreachable: {0}")]
    Unreachable(String),

    /// The service does not know the addressed channel.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The service answered with something that is not a valid reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Driver configuration error.
    #[error("gateway configuration error: {0}")]
    Config(String),

    /// Driver not found.
    #[error("gateway driver not found: {0}")]
    DriverNotFound(String),
}

/// Coarse classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, unreachable service or garbled reply. Recoverable.
    Communication,
    /// Unknown channel. Fatal.
    InvalidAddress,
    /// Driver setup problem. Fatal.
    Configuration,
}

impl GatewayError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } | Self::Unreachable(_) | Self::Protocol(_) => {
                FailureKind::Communication
            }
            Self::InvalidAddress(_) => FailureKind::InvalidAddress,
            Self::Config(_) | Self::DriverNotFound(_) => FailureKind::Configuration,
        }
    }

    /// True for failures that are absorbed up to the failure threshold.
    #[inline]
    pub fn is_communication(&self) -> bool {
        self.kind() == FailureKind::Communication
    }
}

/// Factory function type for creating gateway instances.
///
/// The second argument is the per-call timeout the gateway must honour.
pub type GatewayFactory = fn(&GatewayConfig, Duration) -> Result<Box<dyn IoGateway>, GatewayError>;

/// Optional gateway diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayDiagnostics {
    /// Read calls issued.
    pub reads: u64,
    /// Write calls issued.
    pub writes: u64,
    /// Calls that failed for any reason.
    pub failures: u64,
    /// Calls that failed with a timeout.
    pub timeouts: u64,
}

/// Trait defining the interface for I/O gateways.
///
/// The scan engine owns exactly one gateway for the duration of a run and
/// is the only caller. Every call must return within the configured
/// per-call timeout; a gateway never blocks indefinitely.
///
/// # Lifecycle
///
/// 1. `connect()` - Called once in INIT
/// 2. `read_point()` / `write_point()` - Called from refresh and flush
/// 3. `disconnect()` - Called once in DRAINING
///
/// # Batches
///
/// `read_points` / `write_points` default to one call per point. Drivers
/// that can batch must still report one result per point, in order, so a
/// single failing channel never invalidates the others. A driver that
/// reports `supports_atomic_batch` applies a `write_points` batch all or
/// nothing: any failed entry means no output in the batch changed.
pub trait IoGateway: Send {
    /// Returns the driver's unique identifier (e.g., "evok", "simulation").
    fn name(&self) -> &'static str;

    /// Establish the connection to the I/O service.
    ///
    /// # Errors
    /// `GatewayError::Unreachable` if the service cannot be contacted.
    fn connect(&mut self) -> Result<(), GatewayError>;

    /// Read one point.
    fn read_point(&mut self, address: &Address) -> Result<PointValue, GatewayError>;

    /// Write one output point.
    fn write_point(&mut self, address: &Address, value: Value) -> Result<(), GatewayError>;

    /// Read several points, one result per address in the same order.
    fn read_points(&mut self, addresses: &[Address]) -> Vec<Result<PointValue, GatewayError>> {
        addresses.iter().map(|a| self.read_point(a)).collect()
    }

    /// Write several points, one result per write in the same order.
    fn write_points(&mut self, writes: &[(Address, Value)]) -> Vec<Result<(), GatewayError>> {
        writes
            .iter()
            .map(|(a, v)| self.write_point(a, *v))
            .collect()
    }

    /// True when `write_points` applies all writes or none.
    /// Default: false
    fn supports_atomic_batch(&self) -> bool {
        false
    }

    /// Release the connection.
    /// Default: no-op
    fn disconnect(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Get driver-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<GatewayDiagnostics> {
        None
    }
}
