//! Outbound notifications. Delivery is best effort; callers log failures
//! and carry on.

use async_trait::async_trait;
use serde::Serialize;
use service_core::observability::TracedClientExt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub meta: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Posts notifications as JSON to an email relay.
pub struct HttpEmailNotifier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpEmailNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let response = self
            .client
            .traced_post(&self.endpoint)
            .json(notification)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send POST request to {}: {}", self.endpoint, e);
                anyhow::anyhow!("HTTP request failed: {}", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Email relay responded with {}", status);
        }
        Ok(())
    }
}

/// Logs notifications instead of delivering them.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Keeps every notification it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Poll until at least `count` messages arrived or `within` elapsed,
    /// then return whatever was recorded.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

/// Always fails.
#[derive(Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _notification: &Notification) -> anyhow::Result<()> {
        anyhow::bail!("notification transport unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Notification {
        Notification {
            to: "a@b.test".to_string(),
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            meta: json!({"type": "test"}),
        }
    }

    #[tokio::test]
    async fn recording_notifier_keeps_messages() {
        let notifier = RecordingNotifier::new();
        notifier.send(&sample()).await.unwrap();
        assert_eq!(notifier.sent(), vec![sample()]);
    }

    #[tokio::test]
    async fn http_notifier_reports_unreachable_relay() {
        let notifier = HttpEmailNotifier::new("http://127.0.0.1:9/send", Duration::from_millis(200));
        assert!(notifier.send(&sample()).await.is_err());
    }
}
