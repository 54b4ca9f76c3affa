use async_trait::async_trait;
use serde_json::Value;

use super::{DispositionRecord, SubmitResponse};

/// What the backend said after accepting a disposition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitReceipt {
    pub message: Option<String>,
    pub webhook_response: Option<Value>,
    /// Set when the webhook failed but the backend recorded the disposition anyway.
    pub webhook_error: Option<String>,
}

/// Destination for completed disposition records.
#[async_trait]
pub trait DispositionSink: Send + Sync {
    async fn submit(&self, record: &DispositionRecord) -> Result<SubmitReceipt, ProxyError>;
}

/// Posts dispositions to the backend's `/submit-disposition` proxy.
///
/// Webhook trouble downstream of the proxy is not an error here; only a
/// failure to get a usable answer from the proxy itself is.
pub struct DispositionSubmitter {
    client: reqwest::Client,
    url: String,
}

impl DispositionSubmitter {
    pub fn new(backend_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/submit-disposition", backend_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl DispositionSink for DispositionSubmitter {
    async fn submit(&self, record: &DispositionRecord) -> Result<SubmitReceipt, ProxyError> {
        tracing::info!(
            call_id = %record.call.call_id,
            disposition = %record.disposition,
            "Submitting disposition"
        );

        let resp = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let parsed: SubmitResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ProxyError::Rejected(format!("HTTP {status}")));
            }
            Err(e) => return Err(ProxyError::Parse(e.to_string())),
        };

        if !parsed.success {
            return Err(ProxyError::Rejected(
                parsed
                    .error
                    .unwrap_or_else(|| "Failed to submit disposition".to_string()),
            ));
        }

        if let Some(ref err) = parsed.error {
            tracing::warn!(call_id = %record.call.call_id, "Webhook delivery failed downstream: {err}");
        }

        Ok(SubmitReceipt {
            message: parsed.message,
            webhook_response: parsed.webhook_response,
            webhook_error: parsed.error,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Disposition proxy unreachable: {0}")]
    Request(String),
    #[error("Disposition proxy sent an unreadable response: {0}")]
    Parse(String),
    #[error("Disposition proxy rejected the submission: {0}")]
    Rejected(String),
}
