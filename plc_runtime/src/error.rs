//! Engine error taxonomy.
//!
//! - `CommunicationFailure` - recoverable until the failure threshold is hit
//! - `InvalidAddress` - fatal
//! - `LogicFailure` - program error, emergency or panic; fatal
//! - `SafeStateWriteFailure` - reported, never blocks shutdown
//! - `Configuration` - the engine could not be built

use plc_common::gateway::GatewayError;
use plc_common::point::Address;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("communication failure on {address}: {detail}")]
    CommunicationFailure { address: String, detail: String },

    #[error("invalid address {address}: {detail}")]
    InvalidAddress { address: String, detail: String },

    #[error("logic failure: {message}")]
    LogicFailure { message: String },

    #[error("safe state not confirmed for {outputs:?}")]
    SafeStateWriteFailure { outputs: Vec<String> },
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::LogicFailure {
            message: message.into(),
        }
    }

    /// Classify a gateway failure on `address`.
    pub fn from_gateway(address: &Address, error: &GatewayError) -> Self {
        match error {
            GatewayError::InvalidAddress(detail) => Self::InvalidAddress {
                address: address.to_string(),
                detail: detail.clone(),
            },
            other => Self::CommunicationFailure {
                address: address.to_string(),
                detail: other.to_string(),
            },
        }
    }
}
