//! Safety module root.
//!
//! Safe-state table enforcement and the consecutive-failure threshold on
//! required inputs.

pub mod monitor;
pub mod table;

pub use monitor::{FailureMonitor, ThresholdBreach};
pub use table::{FailedWrite, RetryPolicy, SafeStateError, SafeStateReport, SafeStateTable};
