pub mod client;
pub mod control;
pub mod listen;

use async_trait::async_trait;
use serde_json::Value;

use control::ControlCommand;

/// Result of placing an outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiatedCall {
    pub call_id: String,
    /// Present when the upstream already resolved the listen URL (the backend
    /// proxy does this before answering `/initiate-call`).
    pub listen_url: Option<String>,
}

/// Point-in-time view of a call as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStatus {
    pub status: String,
    pub listen_url: Option<String>,
    pub ended_reason: Option<String>,
    /// Call duration in seconds, when the provider reports one.
    pub duration: Option<f64>,
}

impl CallStatus {
    pub fn is_ended(&self) -> bool {
        self.status == "ended"
    }

    /// The listen URL, but only once the call is `in-progress`.
    pub fn ready_listen_url(&self) -> Option<&str> {
        if self.status != "in-progress" {
            return None;
        }
        self.listen_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// The three call operations the console needs from the telephony side.
///
/// Implemented by [`client::ProviderClient`] (straight to the voice-AI
/// provider) and by [`crate::backend::BackendClient`] (through our own
/// HTTP proxy, the way the browser console talks to it).
#[async_trait]
pub trait CallProvider: Send + Sync {
    async fn initiate_call(
        &self,
        phone_number: &str,
        customer_name: &str,
    ) -> Result<InitiatedCall, ProviderError>;

    async fn call_status(&self, call_id: &str) -> Result<CallStatus, ProviderError>;

    /// Post a single control command. Never retried.
    async fn send_control(
        &self,
        control_url: &str,
        command: &ControlCommand,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Provider API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Value,
    },
    #[error("Failed to parse provider response: {0}")]
    Parse(String),
    #[error("Listen URL not available after polling ({attempts} attempts)")]
    ResolutionTimeout { attempts: u32 },
}

impl ProviderError {
    /// Message suitable for showing to the agent: the provider's own text
    /// when it sent one, a generic line otherwise.
    pub fn agent_message(&self) -> String {
        match self {
            ProviderError::Api { message, .. } if !message.is_empty() => message.clone(),
            ProviderError::Api { status, .. } => format!("Provider returned HTTP {status}"),
            ProviderError::Request(_) | ProviderError::Parse(_) => {
                "Could not reach the call provider".to_string()
            }
            ProviderError::ResolutionTimeout { .. } => {
                "Listen URL not available after polling".to_string()
            }
        }
    }
}

/// Turn a non-2xx response into `ProviderError::Api`.
///
/// Picks the human-readable message out of `error` or `message` (a string or
/// a list of strings), falling back to the raw body.
pub(crate) async fn api_error(resp: reqwest::Response) -> ProviderError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let details: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

    let field = details.get("error").or_else(|| details.get("message"));
    let message = match field {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        _ if !body.trim().is_empty() => body,
        _ => status.to_string(),
    };

    ProviderError::Api {
        status: status.as_u16(),
        message,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_listen_url_requires_in_progress() {
        let mut status = CallStatus {
            status: "ringing".into(),
            listen_url: Some("wss://host/listen".into()),
            ..Default::default()
        };
        assert_eq!(status.ready_listen_url(), None);

        status.status = "in-progress".into();
        assert_eq!(status.ready_listen_url(), Some("wss://host/listen"));
    }

    #[test]
    fn empty_listen_url_is_not_ready() {
        let status = CallStatus {
            status: "in-progress".into(),
            listen_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(status.ready_listen_url(), None);
    }

    #[test]
    fn agent_message_prefers_provider_text() {
        let err = ProviderError::Api {
            status: 400,
            message: "customer.number must be a valid phone number".into(),
            details: Value::Null,
        };
        assert_eq!(
            err.agent_message(),
            "customer.number must be a valid phone number"
        );

        let err = ProviderError::Request("connection refused".into());
        assert_eq!(err.agent_message(), "Could not reach the call provider");
    }
}
