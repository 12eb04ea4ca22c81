//! Emergency notifications for critical alerts.
//!
//! The dispatcher delivers at most once per alert: it must win a claim on the
//! alert row before sending, marks the alert sent on success and releases the
//! claim on failure so a later attempt may retry.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use shield_config::NotificationConfig;
use shield_database::Store;
use shield_models::{Alert, AlertSeverity};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected notification with status {0}")]
    Rejected(u16),
}

/// What is sent to the emergency contact.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub to: String,
    pub alert_id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub body: String,
}

impl NotificationMessage {
    pub fn for_alert(alert: &Alert, destination: &str) -> Self {
        Self {
            to: destination.to_string(),
            alert_id: alert.id,
            title: alert.title.clone(),
            message: alert.message.clone(),
            severity: alert.severity,
            body: format!("CYBER SECURITY ALERT\n{}\n{}", alert.title, alert.message),
        }
    }
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), TransportError>;

    fn name(&self) -> &'static str;
}

/// Posts the message as JSON to an SMS/webhook gateway.
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, message: &NotificationMessage) -> Result<(), TransportError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Writes the notification to the log. Used when no gateway is configured.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, message: &NotificationMessage) -> Result<(), TransportError> {
        warn!(
            to = %message.to,
            alert_id = %message.alert_id,
            severity = %message.severity,
            title = %message.title,
            "EMERGENCY ALERT: {}",
            message.message
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Pick the transport for `config`: the webhook when a URL is set, the log otherwise.
pub fn transport_from_config(config: &NotificationConfig) -> Arc<dyn NotificationTransport> {
    match &config.webhook_url {
        Some(url) => Arc::new(WebhookTransport::new(url.clone())),
        None => Arc::new(LogTransport),
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn NotificationTransport>,
    destination: String,
    timeout: Duration,
    claim_ttl: chrono::Duration,
    enabled: bool,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn NotificationTransport>,
        config: &NotificationConfig,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            transport,
            destination: config.destination.clone(),
            timeout: config.timeout,
            claim_ttl: chrono::Duration::from_std(config.claim_ttl).unwrap_or_else(|_| chrono::Duration::seconds(60)),
            enabled,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send the alert's notification unless it was already sent or is being
    /// sent elsewhere. Returns true only when this call delivered it.
    pub async fn notify(&self, alert: &Alert) -> bool {
        if !self.enabled {
            debug!(alert_id = %alert.id, "Notifications disabled, skipping");
            return false;
        }
        if alert.notification_sent {
            debug!(alert_id = %alert.id, "Notification already sent");
            return false;
        }

        let now = Utc::now();
        match self.store.claim_notification(alert.id, now, now - self.claim_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(alert_id = %alert.id, "Notification already sent or claimed");
                return false;
            }
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "Failed to claim notification");
                return false;
            }
        }

        let message = NotificationMessage::for_alert(alert, &self.destination);
        let sent = match tokio::time::timeout(self.timeout, self.transport.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };

        match sent {
            Ok(()) => match self.store.mark_notification_sent(alert.id).await {
                Ok(()) => {
                    info!(
                        alert_id = %alert.id,
                        to = %self.destination,
                        transport = self.transport.name(),
                        "Emergency notification sent"
                    );
                    true
                }
                Err(e) => {
                    // The claim stays in place until it goes stale.
                    error!(alert_id = %alert.id, error = %e, "Notification sent but not recorded");
                    false
                }
            },
            Err(e) => {
                warn!(
                    alert_id = %alert.id,
                    transport = self.transport.name(),
                    error = %e,
                    "Emergency notification failed"
                );
                if let Err(e) = self.store.release_notification_claim(alert.id).await {
                    error!(alert_id = %alert.id, error = %e, "Failed to release notification claim");
                }
                false
            }
        }
    }
}
