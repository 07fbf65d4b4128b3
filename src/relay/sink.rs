//! Downstream consumers of inbound messages
//!
//! The clinic backend receives inbound messages through a webhook
//! (`POST {WEBHOOK_URL}` with the [`InboundMessage`] JSON). One attempt,
//! bounded by a timeout, no retry.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::inbound::InboundMessage;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("webhook unreachable: {0}")]
    Unreachable(String),

    #[error("webhook answered HTTP {0}")]
    Rejected(u16),
}

/// Something that accepts relayed inbound messages
#[async_trait]
pub trait InboundSink: Send + Sync + 'static {
    async fn forward(&self, message: &InboundMessage) -> Result<(), SinkError>;
}

/// Webhook configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Posts inbound messages to the clinic backend
pub struct WebhookSink {
    config: WebhookConfig,
    http_client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self, SinkError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http_client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl InboundSink for WebhookSink {
    async fn forward(&self, message: &InboundMessage) -> Result<(), SinkError> {
        let response = self
            .http_client
            .post(&self.config.url)
            .json(message)
            .send()
            .await
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }

        debug!(url = %self.config.url, from = %message.source_address, "Inbound message delivered to webhook");
        Ok(())
    }
}

/// Used when no webhook is configured; inbound messages are only logged
/// and pushed to real-time subscribers
pub struct LogSink;

#[async_trait]
impl InboundSink for LogSink {
    async fn forward(&self, message: &InboundMessage) -> Result<(), SinkError> {
        info!(
            from = %message.source_address,
            kind = message.kind.as_str(),
            "Inbound message (no webhook configured)"
        );
        Ok(())
    }
}
