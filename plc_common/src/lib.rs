//! PLC Common Library
//!
//! Shared types for all PLC workspace crates: the point model, the I/O
//! gateway trait and configuration loading.
//!
//! # Module Structure
//!
//! - [`point`] - Addresses, values and point snapshots
//! - [`gateway`] - `IoGateway` trait and gateway errors
//! - [`io`] - Point configuration and registry
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Defaults and bounds
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use plc_common::prelude::*;
//! use plc_common::config::PlcConfig;
//! ```

pub mod config;
pub mod consts;
pub mod gateway;
pub mod io;
pub mod point;
pub mod prelude;
