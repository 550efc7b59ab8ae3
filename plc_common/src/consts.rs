//! System-wide constants for the PLC workspace.
//!
//! Single source of truth for numeric limits, defaults and bounds.
//! Imported by all crates.

/// Default scan period in milliseconds.
pub const SCAN_PERIOD_MS_DEFAULT: u64 = 100;
/// Minimum accepted scan period [ms].
pub const SCAN_PERIOD_MS_MIN: u64 = 1;
/// Maximum accepted scan period [ms].
pub const SCAN_PERIOD_MS_MAX: u64 = 60_000;

/// Default per-call gateway timeout in milliseconds.
pub const IO_TIMEOUT_MS_DEFAULT: u64 = 500;
/// Minimum accepted gateway timeout [ms].
pub const IO_TIMEOUT_MS_MIN: u64 = 1;
/// Maximum accepted gateway timeout [ms].
pub const IO_TIMEOUT_MS_MAX: u64 = 30_000;

/// Default number of consecutive invalid reads before a fault.
pub const FAILURE_THRESHOLD_DEFAULT: u32 = 3;
/// Upper bound for the consecutive-failure threshold.
pub const FAILURE_THRESHOLD_MAX: u32 = 1_000;

/// Default write attempts per output when applying the safe state.
pub const WRITE_RETRIES_DEFAULT: u32 = 3;
/// Upper bound for safe-state write attempts.
pub const WRITE_RETRIES_MAX: u32 = 100;

/// Default pause between safe-state write attempts [ms].
pub const RETRY_BACKOFF_MS_DEFAULT: u64 = 10;

/// Default bound on the program's fault and stop hooks [ms].
pub const SHUTDOWN_TIMEOUT_MS_DEFAULT: u64 = 1_000;

/// Default upper bound on one `on_cycle` call [ms].
pub const CYCLE_TIMEOUT_MS_DEFAULT: u64 = 1_000;
/// Maximum accepted `on_cycle` bound [ms].
pub const CYCLE_TIMEOUT_MS_MAX: u64 = 60_000;

/// Default number of restarts after a fault.
pub const MAX_RESTARTS_DEFAULT: u32 = 3;

/// Default pause before a restart [ms].
pub const RESTART_DELAY_MS_DEFAULT: u64 = 1_000;

/// Default number of I/O events kept by the simulation driver.
pub const SIM_LOG_CAPACITY_DEFAULT: usize = 10_000;

/// Default SMTP submission port for fault notifications.
pub const SMTP_PORT_DEFAULT: u16 = 587;
/// Default delivery attempts per fault notification.
pub const NOTIFY_RETRIES_DEFAULT: u32 = 5;
/// Upper bound for notification delivery attempts.
pub const NOTIFY_RETRIES_MAX: u32 = 20;
/// Default pause between notification attempts [ms].
pub const NOTIFY_BACKOFF_MS_DEFAULT: u64 = 1_000;
/// Default SMTP connection timeout [ms].
pub const NOTIFY_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// Default Evok REST host.
pub const EVOK_HOST_DEFAULT: &str = "localhost";

/// Default Evok REST port.
pub const EVOK_PORT_DEFAULT: u16 = 8080;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/plc/plc.toml";
