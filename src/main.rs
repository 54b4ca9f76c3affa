mod ansi;
mod api;
mod backend;
mod config;
mod console;
mod disposition;
mod provider;
mod session;
mod setup;
mod validation;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use config::Config;
use disposition::webhook::WebhookForwarder;
use provider::client::ProviderClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub provider: Arc<ProviderClient>,
    /// Where submitted dispositions are forwarded, if configured.
    pub webhook: Arc<WebhookForwarder>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            provider: Arc::new(ProviderClient::new(&config.provider)),
            webhook: Arc::new(WebhookForwarder::new(&config.disposition)),
            config,
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--setup") => setup::run(),
        Some("--console") => {
            init_tracing("agent_console=warn");
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(run_console());
        }
        Some("--version") => println!("agent-console {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            init_tracing("agent_console=info,tower_http=info");
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("agent-console {VERSION}");
    println!("Call-center agent console for outbound voice-AI calls");
    println!();
    println!("Usage: agent-console [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --console   Run the interactive agent console against the backend");
    println!("  --setup     Run interactive configuration wizard");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the backend server.");
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_console() {
    let config = load_config();
    if let Err(e) = console::run(config).await {
        eprintln!("Console error: {e}");
        std::process::exit(1);
    }
}

async fn server() {
    let config = load_config();

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting agent-console backend"
    );

    if config.provider.api_key.is_empty() {
        tracing::warn!("No provider API key configured (VAPI_API_KEY); calls will be rejected");
    }
    match config.disposition.webhook_url {
        Some(ref url) => tracing::info!(url = %url, "Forwarding dispositions to webhook"),
        None => tracing::info!("No disposition webhook configured, dispositions are logged only"),
    }

    let state = AppState::new(config.clone());
    let app = api::router(state);

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Invalid server address: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
