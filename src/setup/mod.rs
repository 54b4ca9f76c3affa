mod prompts;
mod writer;

use std::io::IsTerminal;

use crate::ansi;
use crate::config;

use writer::SetupValues;

/// Entry point for `agent-console --setup`.
pub fn run() {
    if !std::io::stdin().is_terminal() {
        eprintln!("Error: --setup requires an interactive terminal");
        std::process::exit(1);
    }

    println!();
    println!("  {}", ansi::bold("agent-console setup"));
    println!("  {}", ansi::dim("Interactive configuration wizard"));

    // Provider
    println!("\n  {} Vapi", ansi::bold(">>"));
    let vapi_api_key = prompts::ask_secret("API Key");
    let phone_number_id = prompts::ask("Phone Number ID", None);
    let assistant_id = prompts::ask("Assistant ID", None);

    // Dispositions
    println!("\n  {} Dispositions", ansi::bold(">>"));
    println!(
        "  {}",
        ansi::dim("Webhook that receives each disposition (leave empty to only log them)")
    );
    let webhook_url = loop {
        let url = prompts::ask("Webhook URL", Some(""));
        if url.is_empty() || is_http_url(&url) {
            break url;
        }
        println!("  {} Expected an http:// or https:// URL", ansi::red("!"));
    };

    // Server
    println!("\n  {} Server", ansi::bold(">>"));
    let port = loop {
        match prompts::ask("Port", Some("8080")).parse() {
            Ok(port) => break port,
            Err(_) => println!("  {} Not a valid port", ansi::red("!")),
        }
    };
    let frontend_url = prompts::ask("Browser UI origin", Some("http://localhost:3000"));

    let values = SetupValues {
        vapi_api_key,
        phone_number_id,
        assistant_id,
        webhook_url,
        port,
        frontend_url,
    };

    let dir = config::config_dir();
    if let Err(e) = writer::write_config(&dir, &values) {
        eprintln!(
            "  {} Failed to write configuration: {e}",
            ansi::red("\u{2717}")
        );
        std::process::exit(1);
    }

    println!("\n  {} Setup complete!", ansi::green("\u{2713}"));
    println!();
    println!("  Next steps:");
    println!("    1. Review {}", dir.join("config.toml").display());
    println!("    2. Run the backend: agent-console");
    println!("    3. In another terminal: agent-console --console");
    println!();
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
