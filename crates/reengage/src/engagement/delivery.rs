use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::DeliveryConfig;

/// Message handed to the delivery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait MailDelivery: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("delivery transport failed: {0}")]
    Transport(String),
    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
}

/// Writes the send to the log instead of contacting a mail provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelivery;

#[async_trait]
impl MailDelivery for LoggingDelivery {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            body_bytes = email.html_body.len(),
            "email delivered to log sink"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct HttpRelayDelivery {
    client: reqwest::Client,
    relay_url: String,
    from_address: String,
    timeout: Duration,
}

impl HttpRelayDelivery {
    pub fn new(relay_url: impl Into<String>, config: &DeliveryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: relay_url.into(),
            from_address: config.from_address.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl MailDelivery for HttpRelayDelivery {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let request = RelayRequest {
            from: &self.from_address,
            to: &email.to,
            subject: &email.subject,
            html: &email.html_body,
        };

        let response = self
            .client
            .post(&self.relay_url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    DeliveryError::TimedOut(self.timeout)
                } else {
                    DeliveryError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected(format!("{status}: {detail}")));
        }
        if !status.is_success() {
            return Err(DeliveryError::Transport(format!("relay returned {status}")));
        }
        Ok(())
    }
}

/// Pick the relay when one is configured, otherwise the log sink.
pub fn delivery_from_config(config: &DeliveryConfig) -> Arc<dyn MailDelivery> {
    match &config.relay_url {
        Some(url) => Arc::new(HttpRelayDelivery::new(url.clone(), config)),
        None => Arc::new(LoggingDelivery),
    }
}
