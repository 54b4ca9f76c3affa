use std::time::Duration;

use serde_json::Value;

use crate::config::DispositionConfig;

/// Forwards disposition records to the operator's webhook.
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookForwarder {
    pub fn new(config: &DispositionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default webhook client: {e}");
                reqwest::Client::new()
            });
        Self {
            client,
            url: config
                .webhook_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// POST the record as-is. Returns the webhook's reply, parsed as JSON when
    /// possible and as a plain string otherwise.
    pub async fn forward(&self, record: &Value) -> Result<Value, WebhookError> {
        let url = self.url.as_deref().ok_or(WebhookError::NotConfigured)?;

        let resp = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| WebhookError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(WebhookError::Status(format!("{status}: {body}")));
        }

        tracing::info!(status = status.as_u16(), "Webhook accepted disposition");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("No webhook configured")]
    NotConfigured,
    #[error("Webhook request failed: {0}")]
    Request(String),
    #[error("Webhook returned error: {0}")]
    Status(String),
}
