//! I/O point configuration.
//!
//! Deserialized from the `[[points]]` array of the PLC configuration.

use serde::{Deserialize, Serialize};

use crate::point::{Address, Value};

/// One configured I/O point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    /// Physical channel, e.g. `di/1_01`.
    pub address: Address,

    /// Program-facing name. Unique across all points.
    pub label: String,

    /// Inputs only: invalid reads count toward the failure threshold.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Digital inputs only: contact is normally closed, readings are inverted.
    #[serde(default)]
    pub normal_closed: bool,

    /// Outputs only: cache value before the first cycle. Never written on its own.
    #[serde(default)]
    pub init_value: Option<Value>,
}

fn default_required() -> bool {
    true
}

impl PointConfig {
    /// Convenience constructor with default flags.
    pub fn new(address: Address, label: impl Into<String>) -> Self {
        Self {
            address,
            label: label.into(),
            required: true,
            normal_closed: false,
            init_value: None,
        }
    }
}
