//! Delivery of data refresh alerts to an HTTP webhook.

use std::time::Duration;

use async_trait::async_trait;
use config::shared::NotificationConfig;
use refresh::bail;
use refresh::error::{ErrorKind, RefreshResult};
use refresh::notification::{Notification, NotificationSender, Priority};
use refresh::refresh_error;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

/// Name reported as the origin of every alert.
const NOTIFICATION_SOURCE: &str = "refresher";

/// Request payload posted to the webhook.
#[derive(Debug, Clone, Serialize)]
struct NotificationRequest<'a> {
    source: &'static str,
    summary: &'a str,
    detail: &'a str,
    priority: Priority,
}

impl<'a> From<&'a Notification> for NotificationRequest<'a> {
    fn from(notification: &'a Notification) -> Self {
        Self {
            source: NOTIFICATION_SOURCE,
            summary: &notification.summary,
            detail: &notification.detail,
            priority: notification.priority,
        }
    }
}

/// Posts every notification as JSON to the configured webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotificationSender {
    client: reqwest::Client,
    webhook_url: String,
    api_key: Option<SecretString>,
}

impl WebhookNotificationSender {
    pub fn new(config: &NotificationConfig) -> RefreshResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                refresh_error!(
                    ErrorKind::ConfigError,
                    "Notification client could not be created",
                    source: err
                )
            })?;

        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send(&self, notification: Notification) -> RefreshResult<()> {
        info!(
            summary = %notification.summary,
            priority = %notification.priority,
            "sending data refresh notification"
        );

        let mut request = self
            .client
            .post(&self.webhook_url)
            .json(&NotificationRequest::from(&notification));
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key.expose_secret());
        }

        let response = request.send().await.map_err(|err| {
            refresh_error!(
                ErrorKind::NotificationFailed,
                "Notification could not be sent",
                source: err
            )
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_owned());
            warn!(status = %status, body = %body, "notification webhook rejected the request");

            bail!(
                ErrorKind::NotificationFailed,
                "Notification webhook rejected the request",
                format!("The webhook returned status {status}: {body}")
            );
        }

        Ok(())
    }
}
