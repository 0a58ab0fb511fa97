//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::header::{HeaderName, HeaderValue};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::delivery::{Notification, Notifier};
use crate::error::DeliveryError;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `LIST_SMTP_HOST` is not set (delivery disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("LIST_SMTP_HOST").ok()?;

        let port: u16 = std::env::var("LIST_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("LIST_SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("LIST_SMTP_PASSWORD").unwrap_or_default());

        Some(Self {
            host,
            port,
            username,
            password,
        })
    }
}

// ── Message building ────────────────────────────────────────────────

/// Convert a notification into a lettre message.
pub fn build_message(notification: &Notification) -> Result<Message, DeliveryError> {
    let from = notification
        .sender
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: notification.sender.clone(),
            reason: format!("{e}"),
        })?;
    let to = notification
        .recipient
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: notification.recipient.clone(),
            reason: format!("{e}"),
        })?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject.as_str());

    for (name, value) in &notification.headers {
        let header_name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| DeliveryError::Build(format!("Invalid header name {name:?}: {e}")))?;
        builder = builder.raw_header(HeaderValue::new(header_name, value.clone()));
    }

    builder
        .body(notification.body.clone())
        .map_err(|e| DeliveryError::Build(format!("{e}")))
}

// ── Notifier ────────────────────────────────────────────────────────

/// Sends notifications through an SMTP relay.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(config: &SmtpConfig) -> Result<SmtpTransport, DeliveryError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        Ok(SmtpTransport::relay(&config.host)
            .map_err(|e| DeliveryError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let email = build_message(notification)?;
        let config = self.config.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || {
            let transport = Self::transport(&config)?;
            transport
                .send(&email)
                .map_err(|e| DeliveryError::SendFailed(format!("SMTP send failed: {e}")))?;
            Ok::<(), DeliveryError>(())
        })
        .await
        .map_err(|e| DeliveryError::SendFailed(format!("SMTP task failed: {e}")))??;

        tracing::info!(id = %notification.id, to = %notification.recipient, "Notification sent");
        Ok(())
    }
}
