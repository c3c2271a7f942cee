//! Notifications - Alerts about optimization changes and fatal failures

use anyhow::Result;
use tracing::{error, info, warn};

use super::error::Error;
use super::settings::{Config, EmailSettings};

/// Delivers human-readable alerts
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Send an alert, logging instead of failing when delivery does not work
pub fn notify_best_effort(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.notify(subject, body) {
        warn!("Failed to send notification '{}': {}", subject, e);
    }
}

/// Log a fatal error and alert the operator when email is configured
pub fn report_fatal(config: &Config, notifier: &dyn Notifier, err: &Error) {
    error!("Fatal error: {}", err);
    if !config.email.is_configured() {
        return;
    }
    notify_best_effort(
        notifier,
        &format!("{}: Fatal error", config.miner_name),
        &format!(
            "{}\r\nPlease review the miner for details and report this issue.\r\n",
            err
        ),
    );
}

/// Writes alerts to the log, addressed to the configured recipient
///
/// SMTP transport lives outside this crate; this keeps alerts visible in the
/// log until one is plugged in.
pub struct TracingNotifier {
    email: EmailSettings,
}

impl TracingNotifier {
    pub fn new(email: EmailSettings) -> Self {
        Self { email }
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        if self.email.to.trim().is_empty() {
            anyhow::bail!("No notification recipient configured");
        }
        info!(
            to = %self.email.to,
            from = %self.email.from,
            server = %self.email.server,
            port = %self.email.port,
            "Notification: {}\n{}",
            subject,
            body
        );
        Ok(())
    }
}
