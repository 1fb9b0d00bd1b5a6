//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers notifications as emails through an SMTP relay. Port 465 uses
//! implicit TLS; other ports use STARTTLS unless TLS is disabled.

use std::time::Duration;

use pulse_core::config::AlertConfig;

use crate::traits::{Notification, Notifier, NotifyError};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    /// Async SMTP transport for sending emails.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Sender mailbox.
    from: Mailbox,
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("{addr:?}: {e}")))
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP settings.
    ///
    /// - `smtp_host`: SMTP relay hostname.
    /// - `smtp_port`: 465 selects implicit TLS; anything else STARTTLS when `tls` is set.
    /// - `from`: Sender address (e.g. `"alerts@example.com"` or `"Alerts <alerts@example.com>"`).
    /// - `credentials`: `(username, password)` for relays that require login.
    /// - `timeout`: socket timeout handed to the transport.
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        tls: bool,
        from: &str,
        credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let from_mailbox = parse_mailbox(from)?;

        let mut builder = if smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(smtp_port)
        };

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.timeout(Some(timeout)).build(),
            from: from_mailbox,
        })
    }

    /// Build from the alerting section of the configuration.
    ///
    /// Fails with [`NotifyError::Config`] when no SMTP host is set or the
    /// alert recipient is not a valid mailbox.
    pub fn from_config(config: &AlertConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is not set".to_string()))?;
        config
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("ALERT_RECIPIENT {:?}: {e}", config.recipient)))?;
        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };
        Self::new(
            host,
            config.smtp_port,
            config.smtp_tls,
            &config.sender,
            credentials,
            config.timeout(),
        )
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&notification.recipient)?)
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            recipient = %notification.recipient,
            "notification delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
