//! # PLC Runtime Library
//!
//! Soft-PLC scan engine. Each run drives one state machine:
//!
//! ```text
//! INIT ──► RUNNING ──► DRAINING ──► STOPPED
//!   │         │            ▲
//!   └────► FAULTED ────────┘
//! ```
//!
//! Every RUNNING cycle refreshes the [`cache::IoCache`] from the gateway,
//! runs the [`program::ControlProgram`] against it, and flushes staged
//! outputs. Any fault drives every output to its entry in the
//! [`safety::SafeStateTable`] before the program's hooks run.
//!
//! ## Modules
//!
//! - [`cycle`] - `ScanEngine`, cycle pacing and statistics
//! - [`cache`] - Per-cycle snapshot of point values
//! - [`state`] - Run-state machine
//! - [`safety`] - Safe-state table and failure threshold
//! - [`program`] - Control program capability set
//! - [`programs`] - Program registry, bundled programs and building blocks
//! - [`supervisor`] - Restart policy across runs
//! - [`notify`] - Fault e-mail, delivered off the scan thread
//! - [`report`] - Final run report
//! - [`error`] - Engine error taxonomy

pub mod cache;
pub mod cycle;
pub mod error;
pub mod notify;
pub mod program;
pub mod programs;
pub mod report;
pub mod safety;
pub mod state;
pub mod supervisor;

pub use crate::cycle::{ScanEngine, StopSignal};
pub use crate::supervisor::Supervisor;
