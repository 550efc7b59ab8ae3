//! Prelude module for common re-exports.
//!
//! ```rust
//! use plc_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, PlcConfig, SharedConfig};

// ─── Points ─────────────────────────────────────────────────────────
pub use crate::point::{Address, PointKind, PointValue, Validity, Value, ValueType};

// ─── I/O ────────────────────────────────────────────────────────────
pub use crate::io::registry::{PointBinding, PointRegistry};

// ─── Gateway ────────────────────────────────────────────────────────
pub use crate::gateway::{FailureKind, GatewayError, IoGateway};
