//! I/O point configuration and the runtime point registry.
//!
//! Parsed once at startup; the registry is immutable for the rest of the run.

pub mod config;
pub mod registry;
