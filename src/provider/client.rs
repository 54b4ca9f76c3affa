use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::ProviderConfig;

use super::control::ControlCommand;
use super::{api_error, CallProvider, CallStatus, InitiatedCall, ProviderError};

/// Voice-AI provider REST client: places calls, looks them up, and posts
/// control commands.
pub struct ProviderClient {
    client: reqwest::Client,
    api_key: String,
    phone_number_id: String,
    assistant_id: String,
    base_url: String,
}

/// The slice of the provider's call object we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderCall {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    monitor: Option<Monitor>,
    #[serde(default)]
    ended_reason: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Monitor {
    #[serde(default)]
    listen_url: Option<String>,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            phone_number_id: config.phone_number_id.clone(),
            assistant_id: config.assistant_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_call(&self, call_id: &str) -> Result<ProviderCall, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/call/{}", self.base_url, call_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        resp.json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CallProvider for ProviderClient {
    /// Place an outbound call from the configured line with the configured
    /// assistant. The listen URL is not known yet; see
    /// [`super::listen::resolve_listen_url`].
    async fn initiate_call(
        &self,
        phone_number: &str,
        customer_name: &str,
    ) -> Result<InitiatedCall, ProviderError> {
        let name = match customer_name.trim() {
            "" => "Unknown",
            name => name,
        };
        let payload = json!({
            "phoneNumberId": self.phone_number_id,
            "customer": {
                "number": phone_number,
                "name": name,
            },
            "assistantId": self.assistant_id,
        });

        tracing::debug!(
            phone_number_id = %self.phone_number_id,
            assistant_id = %self.assistant_id,
            api_key = %key_prefix(&self.api_key),
            "Creating provider call"
        );

        let resp = self
            .client
            .post(format!("{}/call", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let err = api_error(resp).await;
            tracing::error!(phone_number, "Provider rejected call: {err}");
            return Err(err);
        }

        let call: ProviderCall = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        tracing::info!(phone_number, call_id = %call.id, "Outbound call initiated");
        Ok(InitiatedCall {
            call_id: call.id,
            listen_url: None,
        })
    }

    async fn call_status(&self, call_id: &str) -> Result<CallStatus, ProviderError> {
        let call = self.get_call(call_id).await?;
        Ok(CallStatus {
            status: call.status.unwrap_or_default(),
            listen_url: call.monitor.and_then(|m| m.listen_url),
            ended_reason: call.ended_reason,
            duration: call.duration,
        })
    }

    async fn send_control(
        &self,
        control_url: &str,
        command: &ControlCommand,
    ) -> Result<(), ProviderError> {
        let resp = self
            .client
            .post(control_url)
            .json(command)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        tracing::info!(kind = command.kind(), "Control command accepted");
        Ok(())
    }
}

/// First ten characters of a secret, for logs.
fn key_prefix(key: &str) -> String {
    if key.is_empty() {
        return "NOT SET".to_string();
    }
    let prefix: String = key.chars().take(10).collect();
    format!("{prefix}...")
}
