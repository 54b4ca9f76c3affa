pub mod call;
pub mod control;
pub mod disposition;

use std::path::Path;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// The backend HTTP surface the agent console talks to.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/initiate-call", post(call::handle_initiate))
        .route("/control-call", post(control::handle_control))
        .route("/call-status/{call_id}", get(call::handle_status))
        .route("/submit-disposition", post(disposition::handle_submit))
        .route("/health", get(health));

    // Built browser UI, with client-side routes falling back to index.html
    if let Some(ref dir) = state.config.server.static_dir {
        let index = Path::new(dir).join("index.html");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    app.layer(cors(&state.config.server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health() -> &'static str {
    "ok"
}
