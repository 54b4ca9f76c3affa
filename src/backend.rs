use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::api::call::{CallStatusResponse, InitiateCallRequest, InitiateCallResponse};
use crate::api::control::{ControlCallRequest, ControlCallResponse};
use crate::provider::control::ControlCommand;
use crate::provider::{api_error, CallProvider, CallStatus, InitiatedCall, ProviderError};

/// Talks to our own backend proxy instead of the provider directly, so the
/// console never holds provider credentials.
///
/// `/initiate-call` only answers once the listen URL is known, so the
/// session skips its own resolution step when driven through this client.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CallProvider for BackendClient {
    async fn initiate_call(
        &self,
        phone_number: &str,
        customer_name: &str,
    ) -> Result<InitiatedCall, ProviderError> {
        let resp = self
            .client
            .post(format!("{}/initiate-call", self.base_url))
            .json(&InitiateCallRequest {
                phone_number: phone_number.to_string(),
                customer_name: customer_name.to_string(),
            })
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if resp.status() == StatusCode::GATEWAY_TIMEOUT {
            let body: Value = resp.json().await.unwrap_or_default();
            let attempts = body["details"]["attempts"].as_u64().unwrap_or_default();
            return Err(ProviderError::ResolutionTimeout {
                attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            });
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: InitiateCallResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let call_id = body
            .call_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Parse("response has no callId".to_string()))?;

        tracing::debug!(call_id = %call_id, "Backend placed call");
        Ok(InitiatedCall {
            call_id,
            listen_url: body.listen_url,
        })
    }

    async fn call_status(&self, call_id: &str) -> Result<CallStatus, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/call-status/{}", self.base_url, call_id))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: CallStatusResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(CallStatus {
            status: body.status.unwrap_or_default(),
            listen_url: body.listen_url,
            ended_reason: body.ended_reason,
            duration: body.duration,
        })
    }

    async fn send_control(
        &self,
        control_url: &str,
        command: &ControlCommand,
    ) -> Result<(), ProviderError> {
        let resp = self
            .client
            .post(format!("{}/control-call", self.base_url))
            .json(&ControlCallRequest {
                control_url: control_url.to_string(),
                command: command.clone(),
            })
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: ControlCallResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        if !body.success {
            return Err(ProviderError::Api {
                status: 200,
                message: body.error.unwrap_or_default(),
                details: Value::Null,
            });
        }
        Ok(())
    }
}
