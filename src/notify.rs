use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("rejected with status {0}")]
    Rejected(u16),
}

/// Out-of-band delivery of a passcode to its owner.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, code: &str) -> Result<(), NotifyError>;
}

const SUBJECT: &str = "Your one-time login code";

/// Log-only transport for development: the "email" is the log line.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, code: &str) -> Result<(), NotifyError> {
        info!(to = %recipient, subject = SUBJECT, "mock email: your one-time passcode is {code}");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    code: &'a str,
    subject: &'a str,
}

/// Hands the passcode to an external mail/SMS relay over HTTP.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient: &str, code: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { recipient, code, subject: SUBJECT })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Webhook when `NOTIFY_WEBHOOK_URL` is set, log-only otherwise.
pub fn notifier_from_env() -> std::sync::Arc<dyn Notifier> {
    match std::env::var("NOTIFY_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!(%url, "passcodes delivered through webhook");
            std::sync::Arc::new(WebhookNotifier::new(url.trim()))
        }
        _ => {
            info!("NOTIFY_WEBHOOK_URL not set, passcodes are only logged");
            std::sync::Arc::new(LogNotifier)
        }
    }
}
