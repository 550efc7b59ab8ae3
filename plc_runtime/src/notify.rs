//! Fault notifications.
//!
//! After a run faults and its safe state is out, the engine hands a short
//! text to [`Notifications`]. Delivery runs on a background thread with a
//! bounded number of attempts, so the scan thread never waits on SMTP.

use crate::program::FaultReason;
use crate::safety::SafeStateReport;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use parking_lot::Mutex;
use plc_common::config::NotificationConfig;
use std::fmt::Write as _;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Poll interval while waiting for pending deliveries.
const WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    /// Mailbox or relay settings rejected before anything was sent.
    #[error("invalid notification settings: {0}")]
    Config(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Channel a fault message is delivered through.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message. Called again on error, up to the retry limit.
    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

// ─── E-mail ─────────────────────────────────────────────────────────

/// SMTP delivery with STARTTLS.
pub struct EmailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
    subject: String,
}

impl EmailNotifier {
    /// Build the transport. Nothing is sent and no connection is opened.
    ///
    /// The password comes from the environment variable named by
    /// `password_env`; without it the relay is used without login.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e| NotifyError::Config(format!("sender '{}': {e}", config.sender)))?;
        let to: Mailbox = config
            .recipient
            .parse()
            .map_err(|e| NotifyError::Config(format!("recipient '{}': {e}", config.recipient)))?;

        let mut builder = SmtpTransport::starttls_relay(&config.smtp_server)
            .map_err(|e| NotifyError::Config(format!("{}: {e}", config.smtp_server)))?
            .port(config.port)
            .timeout(Some(config.timeout()));
        match std::env::var(&config.password_env) {
            Ok(password) => {
                builder = builder.credentials(Credentials::new(config.login().to_string(), password));
            }
            Err(_) => warn!(
                "{} not set, sending notifications without SMTP login",
                config.password_env
            ),
        }

        debug!(
            "E-mail notifier: {}:{} -> {}",
            config.smtp_server, config.port, config.recipient
        );
        Ok(Self {
            transport: builder.build(),
            from,
            to,
            subject: config.subject.clone(),
        })
    }

    fn message(&self, text: &str) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .map_err(|e| NotifyError::Config(e.to_string()))
    }
}

impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let email = self.message(message)?;
        self.transport
            .send(&email)
            .map(|_| ())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

// ─── Dispatcher ─────────────────────────────────────────────────────

/// Sends fault messages off the calling thread.
///
/// Clones share the notifier and the set of in-flight deliveries.
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
    attempts: u32,
    backoff: Duration,
    pending: Arc<Mutex<Vec<JoinHandle<bool>>>>,
}

impl Notifications {
    /// `attempts` is clamped to at least one.
    pub fn new(notifier: Arc<dyn Notifier>, attempts: u32, backoff: Duration) -> Self {
        Self {
            notifier,
            attempts: attempts.max(1),
            backoff,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// E-mail notifications from the `[notification]` section.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let notifier = EmailNotifier::from_config(config)?;
        Ok(Self::new(
            Arc::new(notifier),
            config.max_retries,
            config.retry_backoff(),
        ))
    }

    /// Start delivering `message` and return at once.
    pub fn dispatch(&self, message: String) {
        let notifier = Arc::clone(&self.notifier);
        let attempts = self.attempts;
        let backoff = self.backoff;
        let spawned = thread::Builder::new()
            .name("plc-notify".to_string())
            .spawn(move || deliver(notifier.as_ref(), &message, attempts, backoff));
        match spawned {
            Ok(handle) => self.pending.lock().push(handle),
            Err(e) => error!("Cannot spawn notification thread: {}", e),
        }
    }

    /// Wait up to `timeout` for dispatched messages.
    /// Returns the number of deliveries still running.
    pub fn wait(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let mut pending = self.pending.lock();
            pending.retain(|h| !h.is_finished());
            if pending.is_empty() || Instant::now() >= deadline {
                return pending.len();
            }
            drop(pending);
            thread::sleep(WAIT_SLICE);
        }
    }
}

/// Try `attempts` times. True once delivered.
fn deliver(notifier: &dyn Notifier, message: &str, attempts: u32, backoff: Duration) -> bool {
    for attempt in 1..=attempts {
        match notifier.send(message) {
            Ok(()) => {
                info!(
                    "Fault notification sent via {} (attempt {})",
                    notifier.name(),
                    attempt
                );
                return true;
            }
            Err(e @ NotifyError::Config(_)) => {
                error!("Fault notification not sent: {}", e);
                return false;
            }
            Err(e) => {
                warn!(
                    "Fault notification attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                if attempt < attempts {
                    thread::sleep(backoff);
                }
            }
        }
    }
    error!("Fault notification dropped after {} attempt(s)", attempts);
    false
}

/// Text sent when a run faults.
pub fn fault_message(program: &str, reason: &FaultReason, safe_state: &SafeStateReport) -> String {
    let mut text = format!("PLC program '{program}' interrupted: {}\n", reason.cause);
    let _ = writeln!(
        text,
        "Fault raised in {} after {} cycle(s).",
        reason.state, reason.cycle
    );
    let _ = writeln!(
        text,
        "Safe state: {} output(s) applied, {} not confirmed.",
        safe_state.applied.len(),
        safe_state.failed.len()
    );
    for failed in &safe_state.failed {
        let _ = writeln!(text, "  {}: {}", failed.address, failed.error);
    }
    text
}
