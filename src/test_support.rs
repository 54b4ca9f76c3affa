use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::{Config, PollingConfig};

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// In-process stand-in for the voice-AI provider's REST API.
///
/// `POST /call` creates `call-1` (or answers 400 for the number `bad`),
/// `GET /call/{id}` reports `queued` until lookup `ready_on`, then
/// `in-progress` with a listen URL pointing back at this server, and
/// `ended` once [`FakeVapi::hang_up`] is called. Control commands land on
/// `POST /monitor/{id}/control`.
#[derive(Clone, Default)]
pub struct FakeVapi {
    state: Arc<FakeVapiState>,
}

#[derive(Default)]
struct FakeVapiState {
    /// Zero means never ready.
    ready_on: AtomicU32,
    lookups: AtomicU32,
    ended: AtomicBool,
    created: Mutex<Vec<Value>>,
    controls: Mutex<Vec<Value>>,
    ws_base: Mutex<String>,
}

impl FakeVapi {
    pub fn ready_on(n: u32) -> Self {
        let fake = Self::default();
        fake.state.ready_on.store(n, Ordering::SeqCst);
        fake
    }

    pub fn hang_up(&self) {
        self.state.ended.store(true, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> u32 {
        self.state.lookups.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<Value> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn controls(&self) -> Vec<Value> {
        self.state.controls.lock().unwrap().clone()
    }

    pub async fn serve(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        *self.state.ws_base.lock().unwrap() = format!("ws://{addr}");

        let app = Router::new()
            .route("/call", post(create_call))
            .route("/call/{id}", get(get_call))
            .route("/monitor/{id}/control", post(control))
            .with_state(self.state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn create_call(
    State(state): State<Arc<FakeVapiState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let number = body["customer"]["number"].as_str().unwrap_or_default().to_string();
    state.created.lock().unwrap().push(body);
    if number == "bad" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "customer.number must be a valid phone number"})),
        );
    }
    (StatusCode::CREATED, Json(json!({"id": "call-1", "status": "queued"})))
}

async fn get_call(State(state): State<Arc<FakeVapiState>>, Path(id): Path<String>) -> Json<Value> {
    let n = state.lookups.fetch_add(1, Ordering::SeqCst) + 1;
    if state.ended.load(Ordering::SeqCst) {
        return Json(json!({
            "id": id,
            "status": "ended",
            "endedReason": "customer-ended-call",
            "duration": 61.7,
        }));
    }
    let ready_on = state.ready_on.load(Ordering::SeqCst);
    if ready_on > 0 && n >= ready_on {
        let ws_base = state.ws_base.lock().unwrap().clone();
        return Json(json!({
            "id": id,
            "status": "in-progress",
            "monitor": {"listenUrl": format!("{ws_base}/monitor/{id}/listen")},
        }));
    }
    Json(json!({"id": id, "status": "queued"}))
}

async fn control(State(state): State<Arc<FakeVapiState>>, Json(body): Json<Value>) -> StatusCode {
    state.controls.lock().unwrap().push(body);
    StatusCode::OK
}

/// Config aimed at `provider_url` with millisecond polling.
pub fn fast_config(provider_url: &str, webhook_url: Option<String>) -> Config {
    let mut config = Config::default();
    config.provider.api_key = "test-key".into();
    config.provider.phone_number_id = "line-1".into();
    config.provider.assistant_id = "asst-1".into();
    config.provider.base_url = provider_url.to_string();
    config.disposition.webhook_url = webhook_url;
    config.disposition.timeout_secs = 2;
    config.polling = PollingConfig {
        resolve_interval_ms: 10,
        resolve_attempts: 5,
        status_interval_ms: 20,
    };
    config
}
