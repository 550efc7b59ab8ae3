//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the TOML configuration
//! of a PLC run and validate it before the scan engine is built.
//!
//! # Usage
//!
//! ```rust,no_run
//! use plc_common::config::{ConfigLoader, PlcConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = PlcConfig::load(Path::new("plc.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::consts::{
    CYCLE_TIMEOUT_MS_DEFAULT, CYCLE_TIMEOUT_MS_MAX, EVOK_HOST_DEFAULT, EVOK_PORT_DEFAULT,
    FAILURE_THRESHOLD_DEFAULT, FAILURE_THRESHOLD_MAX, IO_TIMEOUT_MS_DEFAULT, IO_TIMEOUT_MS_MAX,
    IO_TIMEOUT_MS_MIN, MAX_RESTARTS_DEFAULT, NOTIFY_BACKOFF_MS_DEFAULT, NOTIFY_RETRIES_DEFAULT,
    NOTIFY_RETRIES_MAX, NOTIFY_TIMEOUT_MS_DEFAULT, RESTART_DELAY_MS_DEFAULT,
    RETRY_BACKOFF_MS_DEFAULT, SCAN_PERIOD_MS_DEFAULT, SCAN_PERIOD_MS_MAX, SCAN_PERIOD_MS_MIN,
    SHUTDOWN_TIMEOUT_MS_DEFAULT, SIM_LOG_CAPACITY_DEFAULT, SMTP_PORT_DEFAULT,
    WRITE_RETRIES_DEFAULT, WRITE_RETRIES_MAX,
};
use crate::io::config::PointConfig;
use crate::io::registry::PointRegistry;
use crate::point::{Address, Value};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "valve-plc"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Runtime ────────────────────────────────────────────────────────

/// Scan engine timing and fault policy.
///
/// Immutable once the engine leaves INIT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Target scan period [ms].
    #[serde(default = "default_scan_period_ms")]
    pub scan_period_ms: u64,

    /// Per-call gateway timeout [ms].
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Consecutive invalid reads of a required input before FAULTED.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Write attempts per output when applying the safe state.
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    /// Pause between safe-state write attempts [ms].
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on one `on_cycle` call [ms]. Overrun faults the run.
    #[serde(default = "default_cycle_timeout_ms")]
    pub cycle_timeout_ms: u64,

    /// Upper bound on the program's fault and stop hooks [ms].
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Start a fresh run after a fault.
    #[serde(default)]
    pub restart_on_fault: bool,

    /// Restarts allowed when `restart_on_fault` is set.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Pause before a restart [ms].
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Stop cleanly after this many cycles. `None` runs until a stop request.
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

fn default_scan_period_ms() -> u64 {
    SCAN_PERIOD_MS_DEFAULT
}
fn default_io_timeout_ms() -> u64 {
    IO_TIMEOUT_MS_DEFAULT
}
fn default_failure_threshold() -> u32 {
    FAILURE_THRESHOLD_DEFAULT
}
fn default_write_retries() -> u32 {
    WRITE_RETRIES_DEFAULT
}
fn default_retry_backoff_ms() -> u64 {
    RETRY_BACKOFF_MS_DEFAULT
}
fn default_cycle_timeout_ms() -> u64 {
    CYCLE_TIMEOUT_MS_DEFAULT
}
fn default_shutdown_timeout_ms() -> u64 {
    SHUTDOWN_TIMEOUT_MS_DEFAULT
}
fn default_max_restarts() -> u32 {
    MAX_RESTARTS_DEFAULT
}
fn default_restart_delay_ms() -> u64 {
    RESTART_DELAY_MS_DEFAULT
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scan_period_ms: SCAN_PERIOD_MS_DEFAULT,
            io_timeout_ms: IO_TIMEOUT_MS_DEFAULT,
            failure_threshold: FAILURE_THRESHOLD_DEFAULT,
            write_retries: WRITE_RETRIES_DEFAULT,
            retry_backoff_ms: RETRY_BACKOFF_MS_DEFAULT,
            cycle_timeout_ms: CYCLE_TIMEOUT_MS_DEFAULT,
            shutdown_timeout_ms: SHUTDOWN_TIMEOUT_MS_DEFAULT,
            restart_on_fault: false,
            max_restarts: MAX_RESTARTS_DEFAULT,
            restart_delay_ms: RESTART_DELAY_MS_DEFAULT,
            max_cycles: None,
        }
    }
}

impl RuntimeConfig {
    #[inline]
    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_period_ms)
    }

    #[inline]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[inline]
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }

    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    #[inline]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(SCAN_PERIOD_MS_MIN..=SCAN_PERIOD_MS_MAX).contains(&self.scan_period_ms) {
            return Err(ConfigError::ValidationError(format!(
                "scan_period_ms {} out of range [{}, {}]",
                self.scan_period_ms, SCAN_PERIOD_MS_MIN, SCAN_PERIOD_MS_MAX
            )));
        }
        if !(IO_TIMEOUT_MS_MIN..=IO_TIMEOUT_MS_MAX).contains(&self.io_timeout_ms) {
            return Err(ConfigError::ValidationError(format!(
                "io_timeout_ms {} out of range [{}, {}]",
                self.io_timeout_ms, IO_TIMEOUT_MS_MIN, IO_TIMEOUT_MS_MAX
            )));
        }
        if self.failure_threshold == 0 || self.failure_threshold > FAILURE_THRESHOLD_MAX {
            return Err(ConfigError::ValidationError(format!(
                "failure_threshold {} out of range [1, {}]",
                self.failure_threshold, FAILURE_THRESHOLD_MAX
            )));
        }
        if self.write_retries == 0 || self.write_retries > WRITE_RETRIES_MAX {
            return Err(ConfigError::ValidationError(format!(
                "write_retries {} out of range [1, {}]",
                self.write_retries, WRITE_RETRIES_MAX
            )));
        }
        if self.cycle_timeout_ms == 0 || self.cycle_timeout_ms > CYCLE_TIMEOUT_MS_MAX {
            return Err(ConfigError::ValidationError(format!(
                "cycle_timeout_ms {} out of range [1, {}]",
                self.cycle_timeout_ms, CYCLE_TIMEOUT_MS_MAX
            )));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "shutdown_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.max_cycles == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_cycles must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Gateway ────────────────────────────────────────────────────────

/// I/O gateway selection and driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Registered driver name ("evok", "simulation").
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Host running the Evok REST API.
    #[serde(default = "default_host")]
    pub host: String,

    /// Evok REST port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Settings for the simulation driver.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_driver() -> String {
    "evok".to_string()
}
fn default_host() -> String {
    EVOK_HOST_DEFAULT.to_string()
}
fn default_port() -> u16 {
    EVOK_PORT_DEFAULT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            host: default_host(),
            port: default_port(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "gateway.driver cannot be empty".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "gateway.host cannot be empty".to_string(),
            ));
        }
        for link in &self.simulation.links {
            if !link.output.is_output() || link.input.is_output() {
                return Err(ConfigError::ValidationError(format!(
                    "simulation link {} -> {} must go from an output to an input",
                    link.output, link.input
                )));
            }
        }
        Ok(())
    }
}

/// Simulation driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Initial raw values of simulated channels.
    #[serde(default)]
    pub initial: BTreeMap<Address, Value>,

    /// Output edges that drive simulated inputs.
    #[serde(default)]
    pub links: Vec<LinkedInput>,

    /// I/O events kept for inspection. Oldest are dropped first; 0 keeps none.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_log_capacity() -> usize {
    SIM_LOG_CAPACITY_DEFAULT
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial: BTreeMap::new(),
            links: Vec::new(),
            log_capacity: SIM_LOG_CAPACITY_DEFAULT,
        }
    }
}

/// A simulated input that follows an output after a delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInput {
    /// Output whose changes are observed.
    pub output: Address,
    /// Input that follows the output.
    pub input: Address,
    /// Reaction delay [ms].
    #[serde(default)]
    pub delay_ms: u64,
    /// Follow the inverted output value.
    #[serde(default)]
    pub invert: bool,
}

// ─── Notification ───────────────────────────────────────────────────

/// E-mail sent after a run faults and its safe state is applied.
///
/// The SMTP password is never stored in the file; it is read from the
/// environment variable named by `password_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// SMTP relay host (STARTTLS).
    pub smtp_server: String,

    /// SMTP submission port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Sender mailbox, also the login name unless `username` is set.
    pub sender: String,

    /// Recipient mailbox.
    pub recipient: String,

    /// SMTP login name.
    #[serde(default)]
    pub username: Option<String>,

    /// Environment variable holding the SMTP password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Message subject.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Delivery attempts before the notification is dropped.
    #[serde(default = "default_notify_retries")]
    pub max_retries: u32,

    /// Pause between delivery attempts [ms].
    #[serde(default = "default_notify_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// SMTP connection timeout [ms].
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_smtp_port() -> u16 {
    SMTP_PORT_DEFAULT
}
fn default_password_env() -> String {
    "PLC_SMTP_PASSWORD".to_string()
}
fn default_subject() -> String {
    "PLC program interrupted".to_string()
}
fn default_notify_retries() -> u32 {
    NOTIFY_RETRIES_DEFAULT
}
fn default_notify_backoff_ms() -> u64 {
    NOTIFY_BACKOFF_MS_DEFAULT
}
fn default_notify_timeout_ms() -> u64 {
    NOTIFY_TIMEOUT_MS_DEFAULT
}

impl NotificationConfig {
    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Longest one notification can take over all its attempts.
    pub fn delivery_bound(&self) -> Duration {
        self.timeout()
            .saturating_add(self.retry_backoff())
            .saturating_mul(self.max_retries)
    }

    /// Login name: `username`, or the sender mailbox.
    pub fn login(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.sender)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp_server.is_empty() {
            return Err(ConfigError::ValidationError(
                "notification.smtp_server cannot be empty".to_string(),
            ));
        }
        for (field, mailbox) in [("sender", &self.sender), ("recipient", &self.recipient)] {
            if !mailbox.contains('@') {
                return Err(ConfigError::ValidationError(format!(
                    "notification.{field} '{mailbox}' is not an e-mail address"
                )));
            }
        }
        if self.max_retries == 0 || self.max_retries > NOTIFY_RETRIES_MAX {
            return Err(ConfigError::ValidationError(format!(
                "notification.max_retries {} out of range [1, {}]",
                self.max_retries, NOTIFY_RETRIES_MAX
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "notification.timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Program ────────────────────────────────────────────────────────

/// Control program selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Registered program name.
    pub name: String,

    /// Program-specific parameters.
    #[serde(default)]
    pub params: toml::Table,
}

// ─── Full Config ────────────────────────────────────────────────────

/// Complete configuration of one PLC instance.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "lamp-plc"
///
/// [runtime]
/// scan_period_ms = 100
///
/// [program]
/// name = "pushbutton_lamp"
///
/// [[points]]
/// address = "di/1_01"
/// label = "pushbutton"
///
/// [[points]]
/// address = "ro/1_01"
/// label = "lamp"
///
/// [safe_state]
/// "ro/1_01" = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    pub shared: SharedConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    pub program: ProgramConfig,

    /// Configured I/O points.
    #[serde(default)]
    pub points: Vec<PointConfig>,

    /// Output address → value enforced on fault and shutdown.
    #[serde(default)]
    pub safe_state: BTreeMap<Address, Value>,

    /// Fault e-mail. Absent disables notifications.
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

impl PlcConfig {
    /// Validate every section and the point table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.runtime.validate()?;
        self.gateway.validate()?;
        if let Some(notification) = &self.notification {
            notification.validate()?;
        }
        if self.program.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "program.name cannot be empty".to_string(),
            ));
        }
        PointRegistry::from_config(&self.points)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
