use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::disposition::SubmitResponse;
use crate::AppState;

/// POST /submit-disposition: Record a disposition and forward it to the webhook.
///
/// The body is passed through untouched. Webhook failures are logged and
/// still answered with `success: true`.
pub async fn handle_submit(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<SubmitResponse>) {
    let record = match payload {
        Ok(Json(record)) => record,
        Err(rejection) => {
            tracing::warn!("Rejected disposition body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(SubmitResponse {
                    success: false,
                    error: Some(rejection.body_text()),
                    ..Default::default()
                }),
            );
        }
    };

    if !record.is_object() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SubmitResponse {
                success: false,
                error: Some("Disposition must be a JSON object".to_string()),
                ..Default::default()
            }),
        );
    }

    let call_id = record["callId"].as_str().unwrap_or("unknown");
    let disposition = record["disposition"].as_str().unwrap_or("none");
    tracing::info!(call_id, disposition, "Disposition received");

    let Some(webhook_url) = state.webhook.url() else {
        tracing::info!(call_id, "No webhook configured, disposition logged only");
        return ok(SubmitResponse {
            success: true,
            message: Some("Disposition saved (no webhook configured)".to_string()),
            ..Default::default()
        });
    };

    match state.webhook.forward(&record).await {
        Ok(reply) => ok(SubmitResponse {
            success: true,
            message: Some("Disposition submitted successfully".to_string()),
            webhook_response: Some(reply),
            error: None,
        }),
        Err(e) => {
            tracing::error!(call_id, webhook = %webhook_url, "Error submitting disposition to webhook: {e}");
            ok(SubmitResponse {
                success: true,
                message: Some("Disposition saved (webhook error logged)".to_string()),
                webhook_response: None,
                error: Some(e.to_string()),
            })
        }
    }
}

fn ok(body: SubmitResponse) -> (StatusCode, Json<SubmitResponse>) {
    (StatusCode::OK, Json(body))
}
