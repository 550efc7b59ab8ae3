//! Point model: addresses, values and per-cycle point snapshots.
//!
//! An [`Address`] follows the Evok REST resource layout `<kind>/<circuit>`
//! (e.g. `di/1_01`, `ro/1_03`, `ao/1_01`). The kind fixes both the
//! direction and the value type of the channel.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

// ─── PointKind ──────────────────────────────────────────────────────

/// Physical channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    /// Digital input.
    Di,
    /// Digital (transistor) output.
    Do,
    /// Relay output.
    Ro,
    /// Analog input.
    Ai,
    /// Analog output.
    Ao,
}

impl PointKind {
    /// Signal direction of this kind.
    pub const fn direction(self) -> Direction {
        match self {
            Self::Di | Self::Ai => Direction::Input,
            Self::Do | Self::Ro | Self::Ao => Direction::Output,
        }
    }

    /// Value type carried by this kind.
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::Di | Self::Do | Self::Ro => ValueType::Boolean,
            Self::Ai | Self::Ao => ValueType::Numeric,
        }
    }

    /// Path segment used by the Evok REST API.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Di => "di",
            Self::Do => "do",
            Self::Ro => "ro",
            Self::Ai => "ai",
            Self::Ao => "ao",
        }
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointKind {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "di" => Ok(Self::Di),
            "do" => Ok(Self::Do),
            "ro" => Ok(Self::Ro),
            "ai" => Ok(Self::Ai),
            "ao" => Ok(Self::Ao),
            _ => Err(AddressError::UnknownKind(s.to_string())),
        }
    }
}

/// Signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Value type of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Numeric,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Numeric => write!(f, "numeric"),
        }
    }
}

// ─── Address ────────────────────────────────────────────────────────

/// Address parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No `/` separator between kind and circuit.
    #[error("address '{0}' is not of the form <kind>/<circuit>")]
    Malformed(String),
    /// Kind segment is not one of di, do, ro, ai, ao.
    #[error("unknown point kind '{0}'")]
    UnknownKind(String),
    /// Circuit segment is empty or contains a path separator.
    #[error("invalid circuit '{0}'")]
    InvalidCircuit(String),
}

/// Stable identifier of one physical channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    kind: PointKind,
    circuit: String,
}

impl Address {
    /// Build an address from its parts.
    pub fn new(kind: PointKind, circuit: impl Into<String>) -> Result<Self, AddressError> {
        let circuit = circuit.into();
        if circuit.is_empty() || circuit.contains('/') || circuit.contains(char::is_whitespace) {
            return Err(AddressError::InvalidCircuit(circuit));
        }
        Ok(Self { kind, circuit })
    }

    /// Channel kind.
    #[inline]
    pub fn kind(&self) -> PointKind {
        self.kind
    }

    /// Circuit identifier (e.g. `1_01`).
    #[inline]
    pub fn circuit(&self) -> &str {
        &self.circuit
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    #[inline]
    pub fn value_type(&self) -> ValueType {
        self.kind.value_type()
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.direction() == Direction::Output
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.circuit)
    }
}

impl FromStr for Address {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, circuit) = s
            .split_once('/')
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
        Self::new(kind.parse()?, circuit)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

// ─── Value ──────────────────────────────────────────────────────────

/// Value of a point: boolean for discrete channels, numeric for analog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
}

impl Value {
    #[inline]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Boolean,
            Self::Number(_) => ValueType::Numeric,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(_) => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(_) => None,
        }
    }

    /// Convert a raw device value into the given value type.
    ///
    /// Discrete channels are reported by some services as `0`/`1`; those
    /// are accepted for boolean points. Any other cross-type value is `None`.
    pub fn coerce(self, ty: ValueType) -> Option<Self> {
        match (self, ty) {
            (Self::Bool(_), ValueType::Boolean) | (Self::Number(_), ValueType::Numeric) => {
                Some(self)
            }
            (Self::Number(n), ValueType::Boolean) if n == 0.0 => Some(Self::Bool(false)),
            (Self::Number(n), ValueType::Boolean) if n == 1.0 => Some(Self::Bool(true)),
            (Self::Bool(b), ValueType::Numeric) => Some(Self::Number(if b { 1.0 } else { 0.0 })),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

// ─── PointValue ─────────────────────────────────────────────────────

/// Freshness of a point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Read (or written) successfully in the current cycle.
    Fresh,
    /// The latest reads failed; `value` holds the last good reading.
    Stale {
        /// Consecutive failed reads.
        consecutive_failures: u32,
    },
    /// Never read successfully.
    Unknown,
}

/// Snapshot of a point at a point in time.
///
/// A failed read never turns into a default value: [`PointValue::as_bool`]
/// and [`PointValue::as_f64`] return `None` unless the value is fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PointValue {
    pub address: Address,
    value: Option<Value>,
    timestamp: Option<Instant>,
    validity: Validity,
}

impl PointValue {
    /// A freshly read value, timestamped now.
    pub fn fresh(address: Address, value: Value) -> Self {
        Self {
            address,
            value: Some(value),
            timestamp: Some(Instant::now()),
            validity: Validity::Fresh,
        }
    }

    /// A point that has never been read.
    pub fn unknown(address: Address) -> Self {
        Self {
            address,
            value: None,
            timestamp: None,
            validity: Validity::Unknown,
        }
    }

    /// Record a failed read, keeping the last good value as stale.
    pub fn mark_failed(&mut self) {
        self.validity = match self.validity {
            Validity::Stale {
                consecutive_failures,
            } => Validity::Stale {
                consecutive_failures: consecutive_failures.saturating_add(1),
            },
            Validity::Fresh | Validity::Unknown => Validity::Stale {
                consecutive_failures: 1,
            },
        };
    }

    #[inline]
    pub fn validity(&self) -> Validity {
        self.validity
    }

    #[inline]
    pub fn is_fresh(&self) -> bool {
        self.validity == Validity::Fresh
    }

    /// Time of the last successful read or write.
    #[inline]
    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    /// Current value, only when fresh.
    #[inline]
    pub fn value(&self) -> Option<Value> {
        if self.is_fresh() { self.value } else { None }
    }

    /// Last successfully obtained value regardless of freshness.
    #[inline]
    pub fn last_known(&self) -> Option<Value> {
        self.value
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        self.value().and_then(|v| v.as_bool())
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        self.value().and_then(|v| v.as_f64())
    }
}
