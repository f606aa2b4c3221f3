//! Alert delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::{NotifyError, Result};

/// Request timeout for webhook deliveries.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers an alert message somewhere a human will see it.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;

    /// Get the notifier name (for logging/debugging).
    fn name(&self) -> &str;
}

/// Send to every notifier. Failures are logged, never returned.
pub async fn dispatch(notifiers: &[Arc<dyn Notifier>], subject: &str, body: &str) {
    for notifier in notifiers {
        if let Err(e) = notifier.notify(subject, body).await {
            error!(notifier = notifier.name(), subject, error = %e, "Alert delivery failed");
        }
    }
}

/// Writes alerts to the log at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        warn!(subject, body, "ALERT");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Payload shape a webhook expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookFormat {
    /// Chat-bot text message: `{"msgtype":"text","text":{"content":"..."}}`.
    #[default]
    ChatText,
    /// Plain `{"subject":"...","body":"..."}`.
    Json,
}

impl WebhookFormat {
    /// Request body for one message.
    #[must_use]
    pub fn payload(self, subject: &str, body: &str) -> serde_json::Value {
        match self {
            Self::ChatText => json!({
                "msgtype": "text",
                "text": { "content": format!("{subject}\n{body}") },
            }),
            Self::Json => json!({ "subject": subject, "body": body }),
        }
    }
}

/// Posts alerts to an HTTP webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    name: String,
    url: String,
    format: WebhookFormat,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, url: impl Into<String>, format: WebhookFormat) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            format,
            client,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.format.payload(subject, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::rejected(status.as_u16(), text));
        }
        info!(notifier = %self.name, subject, "Alert delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenNotifier {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn notify(&self, _subject: &str, _body: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::rejected(500, "down"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_chat_text_payload() {
        let payload = WebhookFormat::ChatText.payload("Queue high", "length 12");
        assert_eq!(payload["msgtype"], "text");
        assert_eq!(payload["text"]["content"], "Queue high\nlength 12");
    }

    #[test]
    fn test_json_payload() {
        let payload = WebhookFormat::Json.payload("s", "b");
        assert_eq!(payload, json!({"subject": "s", "body": "b"}));
    }

    #[tokio::test]
    async fn test_dispatch_keeps_going_after_failure() {
        let broken = Arc::new(BrokenNotifier {
            attempts: AtomicUsize::new(0),
        });
        let notifiers: Vec<Arc<dyn Notifier>> =
            vec![broken.clone(), Arc::new(LogNotifier), broken.clone()];

        dispatch(&notifiers, "subject", "body").await;

        assert_eq!(broken.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_errors() {
        let notifier =
            WebhookNotifier::new("chat", "http://127.0.0.1:9/hook", WebhookFormat::ChatText).unwrap();

        let result = notifier.notify("s", "b").await;

        assert!(matches!(result, Err(NotifyError::Request { .. })));
    }
}
