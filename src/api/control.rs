use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::provider::control::ControlCommand;
use crate::provider::CallProvider;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCallRequest {
    #[serde(rename = "controlUrl")]
    pub control_url: String,
    #[serde(flatten)]
    pub command: ControlCommand,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ControlCallResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /control-call: Forward one control command to a live call.
///
/// Request body is the command plus the call's control URL:
/// ```json
/// { "controlUrl": "https://.../control", "type": "say", "content": "One moment" }
/// ```
pub async fn handle_control(
    State(state): State<AppState>,
    payload: Result<Json<ControlCallRequest>, JsonRejection>,
) -> (StatusCode, Json<ControlCallResponse>) {
    // Unparseable commands answer in the refused-command shape.
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::warn!("Rejected control-call body: {}", rejection.body_text());
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ControlCallResponse {
                    success: false,
                    error: Some(rejection.body_text()),
                }),
            );
        }
    };
    let kind = req.command.kind();
    tracing::info!(control_url = %req.control_url, kind, "Control command requested");

    match state
        .provider
        .send_control(&req.control_url, &req.command)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(ControlCallResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!(kind, "Error controlling call: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ControlCallResponse {
                    success: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
