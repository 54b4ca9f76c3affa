use std::io::{self, BufRead, Write};

use crate::ansi;

/// Prompt for a line of input, returning `default` on an empty answer.
pub fn ask(label: &str, default: Option<&str>) -> String {
    loop {
        match default {
            Some(d) => print!("  {label} {}: ", ansi::dim(&format!("[{d}]"))),
            None => print!("  {label}: "),
        }
        let _ = io::stdout().flush();

        let answer = read_line();
        if !answer.is_empty() {
            return answer;
        }
        if let Some(d) = default {
            return d.to_string();
        }
    }
}

/// Prompt without echoing the answer. Empty answers are allowed so a secret
/// can be left for the environment to supply.
pub fn ask_secret(label: &str) -> String {
    match rpassword::prompt_password(format!("  {label}: ")) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            println!("  {} Could not read input: {e}", ansi::red("\u{2717}"));
            String::new()
        }
    }
}

pub fn confirm(question: &str) -> bool {
    print!("  {question} {} ", ansi::dim("[y/N]"));
    let _ = io::stdout().flush();
    matches!(read_line().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn read_line() -> String {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}
