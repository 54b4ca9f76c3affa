use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::provider::listen;
use crate::provider::{CallProvider, ProviderError};
use crate::validation::ValidationError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallRequest {
    /// Number to dial (E.164, e.g. "+15550100")
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub customer_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub ended_reason: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /initiate-call: Place an outbound call and wait for its listen URL.
///
/// Request body:
/// ```json
/// { "phoneNumber": "+15550100", "customerName": "Ann" }
/// ```
///
/// Answers once the provider reports the call `in-progress`, which can take
/// up to the configured polling budget.
pub async fn handle_initiate(
    State(state): State<AppState>,
    payload: Result<Json<InitiateCallRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::warn!("Rejected initiate-call body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(InitiateCallResponse {
                    error: Some(rejection.body_text()),
                    details: Some(json!({})),
                    ..Default::default()
                }),
            )
                .into_response();
        }
    };
    let phone_number = req.phone_number.trim();
    tracing::info!(phone_number, customer_name = %req.customer_name, "Outbound call requested");

    if phone_number.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(InitiateCallResponse {
                error: Some(ValidationError::EmptyPhoneNumber.to_string()),
                details: Some(json!({})),
                ..Default::default()
            }),
        )
            .into_response();
    }

    let provider = state.provider.as_ref();
    let result = async {
        let call = provider
            .initiate_call(phone_number, &req.customer_name)
            .await?;
        let target =
            listen::resolve_listen_url(provider, &call.call_id, &state.config.polling).await?;
        Ok::<_, ProviderError>((call.call_id, target))
    }
    .await;

    match result {
        Ok((call_id, target)) => {
            tracing::info!(call_id = %call_id, attempts = target.attempts, "Call ready for monitoring");
            (
                StatusCode::OK,
                Json(InitiateCallResponse {
                    success: true,
                    call_id: Some(call_id),
                    listen_url: Some(target.listen_url),
                    status: Some("in-progress".to_string()),
                    ..Default::default()
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to initiate call: {e}");
            initiate_error(e)
        }
    }
}

/// Provider failures keep the provider's status code; a listen URL that
/// never showed up is a 504.
fn initiate_error(err: ProviderError) -> Response {
    let (status, error, details) = match err {
        ProviderError::Api {
            status,
            message,
            details,
        } => (
            StatusCode::from_u16(status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
            if details.is_null() { json!({}) } else { details },
        ),
        ProviderError::ResolutionTimeout { attempts } => (
            StatusCode::GATEWAY_TIMEOUT,
            err.agent_message(),
            json!({ "attempts": attempts }),
        ),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string(), json!({})),
    };

    (
        status,
        Json(InitiateCallResponse {
            error: Some(error),
            details: Some(details),
            ..Default::default()
        }),
    )
        .into_response()
}

/// GET /call-status/{call_id}: Current provider status of a call.
pub async fn handle_status(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> (StatusCode, Json<CallStatusResponse>) {
    match state.provider.call_status(&call_id).await {
        Ok(status) => (
            StatusCode::OK,
            Json(CallStatusResponse {
                success: true,
                status: Some(status.status),
                ended_reason: status.ended_reason,
                duration: status.duration,
                listen_url: status.listen_url,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!(call_id = %call_id, "Error getting call status: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CallStatusResponse {
                    error: Some(e.to_string()),
                    ..Default::default()
                }),
            )
        }
    }
}
