//! Outbound email/SMS notifications
//!
//! Podrelay does not speak SMTP or an SMS gateway protocol itself. A
//! [`Notifier`] hands messages to a relay; [`WebhookNotifier`] posts them as
//! JSON to a configured URL and [`LogNotifier`] only writes them to the log.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::{PodrelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<NotificationLink>,
}

impl NotificationPayload {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            links: Vec::new(),
        }
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push(NotificationLink {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    /// Single-line rendering for SMS
    pub fn sms_text(&self) -> String {
        let mut text = self.subject.clone();
        if let Some(link) = self.links.first() {
            text.push(' ');
            text.push_str(&link.url);
        }
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, recipient: &str, payload: &NotificationPayload) -> Result<()>;

    async fn send_sms(&self, recipient: &str, payload: &NotificationPayload) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Relay messages as JSON to an HTTP endpoint
pub struct WebhookNotifier {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }

    async fn deliver(
        &self,
        channel: Channel,
        recipient: &str,
        payload: &NotificationPayload,
    ) -> Result<()> {
        let text = match channel {
            Channel::Email => payload.body.clone(),
            Channel::Sms => payload.sms_text(),
        };
        let body = serde_json::json!({
            "channel": channel,
            "to": recipient,
            "subject": payload.subject,
            "body": text,
            "links": payload.links,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PodrelayError::Notification(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("Notification webhook failed: {} - {}", status, text);
            return Err(PodrelayError::Notification(format!(
                "Webhook failed: {} - {}",
                status, text
            )));
        }

        tracing::debug!("Sent {:?} notification to {}", channel, recipient);
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_email(&self, recipient: &str, payload: &NotificationPayload) -> Result<()> {
        self.deliver(Channel::Email, recipient, payload).await
    }

    async fn send_sms(&self, recipient: &str, payload: &NotificationPayload) -> Result<()> {
        self.deliver(Channel::Sms, recipient, payload).await
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Write notifications to the log instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, recipient: &str, payload: &NotificationPayload) -> Result<()> {
        tracing::info!(
            recipient,
            subject = %payload.subject,
            "Email notification (no relay configured):\n{}",
            payload.body
        );
        Ok(())
    }

    async fn send_sms(&self, recipient: &str, payload: &NotificationPayload) -> Result<()> {
        tracing::info!(
            recipient,
            "SMS notification (no relay configured): {}",
            payload.sms_text()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub channel: Channel,
    pub recipient: String,
    pub payload: NotificationPayload,
}

/// Notifier that keeps what it was asked to send
///
/// Available in all builds so integration tests can assert on alerts.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<SentNotification>>>,
    pub fail_email: bool,
    pub fail_sms: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_email: true,
            fail_sms: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(
        &self,
        channel: Channel,
        fail: bool,
        recipient: &str,
        payload: &NotificationPayload,
    ) -> Result<()> {
        if fail {
            return Err(PodrelayError::Notification(format!(
                "{:?} relay unavailable",
                channel
            )));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                channel,
                recipient: recipient.to_string(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(&self, recipient: &str, payload: &NotificationPayload) -> Result<()> {
        self.record(Channel::Email, self.fail_email, recipient, payload)
    }

    async fn send_sms(&self, recipient: &str, payload: &NotificationPayload) -> Result<()> {
        self.record(Channel::Sms, self.fail_sms, recipient, payload)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
