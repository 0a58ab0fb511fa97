//! Outbound notifications — automatic replies leave the system through a
//! `Notifier`.

pub mod smtp;

pub use smtp::{SmtpConfig, SmtpNotifier};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DeliveryError;

/// A message generated by the list itself.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    /// Extra headers, in order.
    pub headers: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient: &str, sender: &str, subject: &str, body: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            headers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Something that can deliver notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifier name (for logging).
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Notifier that only logs. Used when no SMTP relay is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            id = %notification.id,
            to = %notification.recipient,
            from = %notification.sender,
            subject = %notification.subject,
            "Notification not sent (no SMTP relay configured)"
        );
        Ok(())
    }
}
