//! Bounded, failure-isolated delivery through one notification channel.
//!
//! Every attempt is capped by a timeout and reported as a
//! [`DispatchResult`]; the dispatcher never returns an error and never
//! retries, so callers can keep going after a failed alert.

use std::time::{Duration, Instant};

use pulse_core::config::AlertConfig;

use crate::email::EmailNotifier;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};

const NO_CHANNEL: &str = "none";

/// Delivers notifications through a single configured channel.
pub struct Dispatcher {
    /// `None` when alerting has no sink configured.
    channel: Option<Box<dyn Notifier>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(channel: Box<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            channel: Some(channel),
            timeout,
        }
    }

    /// A dispatcher with no sink. Every delivery is reported as failed.
    pub fn disabled() -> Self {
        Self {
            channel: None,
            timeout: Duration::ZERO,
        }
    }

    /// Email dispatcher when SMTP is configured, disabled otherwise.
    pub fn from_config(config: &AlertConfig) -> Result<Self, NotifyError> {
        if !config.is_configured() {
            tracing::warn!("SMTP_HOST not set; alerts will be reported as undelivered");
            return Ok(Self::disabled());
        }
        let notifier = EmailNotifier::from_config(config)?;
        Ok(Self::new(Box::new(notifier), config.timeout()))
    }

    pub fn channel_name(&self) -> &str {
        self.channel.as_ref().map_or(NO_CHANNEL, |c| c.channel_name())
    }

    /// Attempt one delivery. Failures and timeouts are returned in the
    /// result, never raised.
    pub async fn dispatch(&self, notification: &Notification) -> DispatchResult {
        let channel_name = self.channel_name().to_string();
        let Some(channel) = &self.channel else {
            return DispatchResult {
                channel: channel_name,
                success: false,
                error: Some(
                    NotifyError::Config("no notification channel configured".to_string())
                        .to_string(),
                ),
                duration_ms: 0,
            };
        };

        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, channel.send(notification)).await {
            Ok(inner) => inner,
            Err(_) => Err(NotifyError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, error) = match result {
            Ok(()) => {
                tracing::info!(
                    channel = %channel_name,
                    subject = %notification.subject,
                    duration_ms,
                    "Notification delivered"
                );
                (true, None)
            }
            Err(e) => {
                tracing::warn!(
                    channel = %channel_name,
                    subject = %notification.subject,
                    error = %e,
                    duration_ms,
                    "Notification delivery failed"
                );
                (false, Some(e.to_string()))
            }
        };

        DispatchResult {
            channel: channel_name,
            success,
            error,
            duration_ms,
        }
    }
}
