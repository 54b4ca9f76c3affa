use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::ansi;

use super::prompts::confirm;

/// All values collected from the wizard prompts.
pub struct SetupValues {
    pub vapi_api_key: String,
    pub phone_number_id: String,
    pub assistant_id: String,
    pub webhook_url: String,
    pub port: u16,
    pub frontend_url: String,
}

/// Write config.toml and .env into `config_dir`, asking before replacing
/// existing files.
pub fn write_config(config_dir: &Path, values: &SetupValues) -> io::Result<()> {
    println!("\n  {} Writing configuration", ansi::bold(">>"));
    fs::create_dir_all(config_dir)?;

    let config_path = config_dir.join("config.toml");
    if may_write(&config_path) {
        fs::write(&config_path, config_toml(values))?;
        println!("  {} {}", ansi::green("\u{2713}"), config_path.display());
    }

    let env_path = config_dir.join(".env");
    if may_write(&env_path) {
        fs::write(&env_path, env_file(values))?;
        // Owner read/write only
        fs::set_permissions(&env_path, fs::Permissions::from_mode(0o600))?;
        println!(
            "  {} {} {}",
            ansi::green("\u{2713}"),
            env_path.display(),
            ansi::dim("(mode 0600)")
        );
    }

    Ok(())
}

fn may_write(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    println!("  {} {name} already exists", ansi::yellow("!"));
    if confirm("Overwrite?") {
        true
    } else {
        println!("  Skipping {name}");
        false
    }
}

fn config_toml(values: &SetupValues) -> String {
    format!(
        r#"[server]
host = "0.0.0.0"
port = {port}
allowed_origins = ["{frontend_url}"]
# static_dir = "/path/to/built/ui"

[provider]
# Secrets loaded from .env (VAPI_API_KEY, VAPI_PHONE_NUMBER_ID, VAPI_ASSISTANT_ID)
api_key = ""
phone_number_id = ""
assistant_id = ""
base_url = "https://api.vapi.ai"

[disposition]
# Loaded from .env (DISPOSITION_WEBHOOK_URL); leave empty to only log dispositions
timeout_secs = 10

[polling]
resolve_interval_ms = 2000
resolve_attempts = 30
status_interval_ms = 3000

[console]
backend_url = "http://localhost:{port}"
"#,
        port = values.port,
        frontend_url = values.frontend_url,
    )
}

fn env_file(values: &SetupValues) -> String {
    format!(
        r#"# Voice-AI provider
VAPI_API_KEY={api_key}
VAPI_PHONE_NUMBER_ID={phone_number_id}
VAPI_ASSISTANT_ID={assistant_id}

# Where dispositions are forwarded (CRM / dialer)
DISPOSITION_WEBHOOK_URL={webhook_url}
"#,
        api_key = values.vapi_api_key,
        phone_number_id = values.phone_number_id,
        assistant_id = values.assistant_id,
        webhook_url = values.webhook_url,
    )
}
