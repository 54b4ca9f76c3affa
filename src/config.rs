use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub disposition: DispositionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Built browser UI to serve, with `index.html` as the SPA fallback.
    #[serde(default)]
    pub static_dir: Option<String>,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8080".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Provider-side identifier of the outbound line calls are placed from.
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub assistant_id: String,
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            phone_number_id: String::new(),
            assistant_id: String::new(),
            base_url: default_provider_base_url(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://api.vapi.ai".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispositionConfig {
    /// Where finished dispositions are forwarded. Unset means log only.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for DispositionConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_resolve_interval")]
    pub resolve_interval_ms: u64,
    #[serde(default = "default_resolve_attempts")]
    pub resolve_attempts: u32,
    #[serde(default = "default_status_interval")]
    pub status_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            resolve_interval_ms: default_resolve_interval(),
            resolve_attempts: default_resolve_attempts(),
            status_interval_ms: default_status_interval(),
        }
    }
}

/// Zero values from the file are raised to the smallest usable ones: a
/// zero-length timer period panics, and zero attempts would never look.
impl PollingConfig {
    pub fn resolve_interval(&self) -> Duration {
        Duration::from_millis(self.resolve_interval_ms.max(1))
    }

    pub fn resolve_attempts(&self) -> u32 {
        self.resolve_attempts.max(1)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }
}

fn default_resolve_interval() -> u64 {
    2000
}

fn default_resolve_attempts() -> u32 {
    30
}

fn default_status_interval() -> u64 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    /// Backend the terminal console talks to.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8080".to_string()
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file from same directory as config.toml
        let env_path = config_dir().join(".env");
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!("Loaded .env from {}", env_path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(
                    "No .env file at {}, using environment only",
                    env_path.display()
                );
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let path = config_path();
        let mut config = if path.exists() {
            tracing::info!("Loading config from {}", path.display());
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read config at {}: {e}", path.display()))?;
            Self::from_toml_str(&contents)?
        } else {
            tracing::info!(
                "No config at {}, using defaults and environment",
                path.display()
            );
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Allow env var overrides for secrets and deployment settings.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("VAPI_API_KEY") {
            self.provider.api_key = v;
        }
        if let Some(v) = var("VAPI_PHONE_NUMBER_ID") {
            self.provider.phone_number_id = v;
        }
        if let Some(v) = var("VAPI_ASSISTANT_ID") {
            self.provider.assistant_id = v;
        }
        if let Some(v) = var("VAPI_API_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = var("DISPOSITION_WEBHOOK_URL") {
            self.disposition.webhook_url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Some(v) = var("PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %v, "Ignoring invalid PORT"),
            }
        }
        if let Some(v) = var("FRONTEND_URL").filter(|url| !url.is_empty()) {
            if !self.server.allowed_origins.contains(&v) {
                self.server.allowed_origins.push(v);
            }
        }
        if let Some(v) = var("AGENT_CONSOLE_BACKEND_URL") {
            self.console.backend_url = v;
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Ok(p) = std::env::var("AGENT_CONSOLE_CONFIG") {
        // If pointing to a file, use its parent directory
        let path = PathBuf::from(p);
        return path.parent().map(|p| p.to_path_buf()).unwrap_or(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".agent-console")
}

fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("AGENT_CONSOLE_CONFIG") {
        return PathBuf::from(p);
    }

    config_dir().join("config.toml")
}
