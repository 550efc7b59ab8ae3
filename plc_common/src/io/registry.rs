//! Point registry: runtime lookup of configured I/O points.
//!
//! Built at startup from the `[[points]]` table. Immutable after
//! construction; lookups by address or label are O(1) HashMap hits.

use std::collections::HashMap;
use std::fmt;

use super::config::PointConfig;
use crate::point::{Address, PointKind, ValueType};

// ─── Error Types ────────────────────────────────────────────────────

/// Point table validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum IoConfigError {
    /// Two points share the same address.
    AddressDuplicate { address: Address },
    /// Two points share the same label.
    LabelDuplicate { label: String },
    /// Label is empty.
    LabelEmpty { address: Address },
    /// `normal_closed` set on something other than a digital input.
    NormalClosedInvalid { address: Address },
    /// `init_value` set on an input.
    InitValueOnInput { address: Address },
    /// `init_value` type does not match the point.
    InitValueType {
        address: Address,
        expected: ValueType,
    },
}

impl fmt::Display for IoConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressDuplicate { address } => {
                write!(f, "duplicate point address '{address}'")
            }
            Self::LabelDuplicate { label } => write!(f, "duplicate point label '{label}'"),
            Self::LabelEmpty { address } => write!(f, "point '{address}' has an empty label"),
            Self::NormalClosedInvalid { address } => {
                write!(f, "normal_closed is only valid on digital inputs ('{address}')")
            }
            Self::InitValueOnInput { address } => {
                write!(f, "init_value is only valid on outputs ('{address}')")
            }
            Self::InitValueType { address, expected } => {
                write!(f, "init_value of '{address}' must be {expected}")
            }
        }
    }
}

impl std::error::Error for IoConfigError {}

// ─── PointBinding ───────────────────────────────────────────────────

/// Runtime binding of a label to its physical point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointBinding {
    pub address: Address,
    pub label: String,
    pub required: bool,
    pub normal_closed: bool,
    pub init_value: Option<crate::point::Value>,
}

impl PointBinding {
    #[inline]
    pub fn is_output(&self) -> bool {
        self.address.is_output()
    }
}

// ─── PointRegistry ──────────────────────────────────────────────────

/// Validated set of configured points.
#[derive(Debug, Clone, Default)]
pub struct PointRegistry {
    points: Vec<PointBinding>,
    by_address: HashMap<Address, usize>,
    by_label: HashMap<String, usize>,
}

impl PointRegistry {
    /// Build and validate the registry from configuration.
    pub fn from_config(points: &[PointConfig]) -> Result<Self, IoConfigError> {
        let mut registry = Self::default();

        for p in points {
            if p.label.trim().is_empty() {
                return Err(IoConfigError::LabelEmpty {
                    address: p.address.clone(),
                });
            }
            if registry.by_address.contains_key(&p.address) {
                return Err(IoConfigError::AddressDuplicate {
                    address: p.address.clone(),
                });
            }
            if registry.by_label.contains_key(&p.label) {
                return Err(IoConfigError::LabelDuplicate {
                    label: p.label.clone(),
                });
            }
            if p.normal_closed && p.address.kind() != PointKind::Di {
                return Err(IoConfigError::NormalClosedInvalid {
                    address: p.address.clone(),
                });
            }
            if let Some(init) = p.init_value {
                if !p.address.is_output() {
                    return Err(IoConfigError::InitValueOnInput {
                        address: p.address.clone(),
                    });
                }
                if init.value_type() != p.address.value_type() {
                    return Err(IoConfigError::InitValueType {
                        address: p.address.clone(),
                        expected: p.address.value_type(),
                    });
                }
            }

            let idx = registry.points.len();
            registry.by_address.insert(p.address.clone(), idx);
            registry.by_label.insert(p.label.clone(), idx);
            registry.points.push(PointBinding {
                address: p.address.clone(),
                label: p.label.clone(),
                // `required` is meaningless for outputs.
                required: p.required && !p.address.is_output(),
                normal_closed: p.normal_closed,
                init_value: p.init_value,
            });
        }

        Ok(registry)
    }

    /// Binding for an address.
    pub fn get(&self, address: &Address) -> Option<&PointBinding> {
        self.by_address.get(address).map(|&i| &self.points[i])
    }

    /// Binding for a label.
    pub fn by_label(&self, label: &str) -> Option<&PointBinding> {
        self.by_label.get(label).map(|&i| &self.points[i])
    }

    /// Address bound to a label.
    pub fn resolve(&self, label: &str) -> Option<&Address> {
        self.by_label(label).map(|b| &b.address)
    }

    #[inline]
    pub fn contains(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    /// All points, in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &PointBinding> {
        self.points.iter()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &PointBinding> {
        self.points.iter().filter(|p| !p.is_output())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PointBinding> {
        self.points.iter().filter(|p| p.is_output())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
