use crate::disposition::DispositionCode;
use crate::provider::control::{AssistantControl, ControlCommand, MessageRole};

/// One line typed at the console prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Dial {
        phone_number: String,
        customer_name: String,
    },
    Command(ControlCommand),
    Status,
    Codes,
    Dispose {
        disposition: String,
        notes: String,
    },
    Cancel,
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Unknown command: {0} (type `help`)")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &[(&str, &str)] = &[
    ("dial <number> [name]", "Place a call"),
    ("say <text>", "Have the assistant speak"),
    ("add [system|user|assistant] <text>", "Add a message to the conversation"),
    ("transfer <number> [message]", "Transfer the caller"),
    ("mute / unmute", "Mute or unmute the assistant"),
    ("first", "Have the assistant say its first message"),
    ("end", "Hang up"),
    ("status", "Show the current call"),
    ("codes", "List disposition codes"),
    ("dispose <code|#> <notes>", "Record the outcome of the ended call"),
    ("cancel", "Discard the ended call without a disposition"),
    ("reset", "Abandon whatever is in progress"),
    ("quit", "Exit"),
];

/// Parse a prompt line. `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Input>, InputError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "dial" | "call" => {
            let (number, name) = split_first(rest);
            if number.is_empty() {
                return Err(InputError::Usage("dial <number> [name]"));
            }
            Input::Dial {
                phone_number: number.to_string(),
                customer_name: name.to_string(),
            }
        }
        "say" => {
            if rest.is_empty() {
                return Err(InputError::Usage("say <text>"));
            }
            Input::Command(ControlCommand::say(rest))
        }
        "add" => {
            let (first, tail) = split_first(rest);
            let (role, content) = match first.parse::<MessageRole>() {
                Ok(role) => (role, tail),
                Err(()) => (MessageRole::default(), rest),
            };
            if content.is_empty() {
                return Err(InputError::Usage("add [system|user|assistant] <text>"));
            }
            Input::Command(ControlCommand::add_message(role, content))
        }
        "transfer" => {
            let (number, message) = split_first(rest);
            if number.is_empty() {
                return Err(InputError::Usage("transfer <number> [message]"));
            }
            let message = (!message.is_empty()).then(|| message.to_string());
            Input::Command(ControlCommand::transfer(number, message))
        }
        "mute" => Input::Command(ControlCommand::control(AssistantControl::MuteAssistant)),
        "unmute" => Input::Command(ControlCommand::control(AssistantControl::UnmuteAssistant)),
        "first" => Input::Command(ControlCommand::control(AssistantControl::SayFirstMessage)),
        "end" | "hangup" => Input::Command(ControlCommand::EndCall),
        "status" => Input::Status,
        "codes" => Input::Codes,
        "dispose" => {
            let (code, notes) = split_first(rest);
            Input::Dispose {
                disposition: by_index(code).unwrap_or(code).to_string(),
                notes: notes.to_string(),
            }
        }
        "cancel" => Input::Cancel,
        "reset" => Input::Reset,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(InputError::Unknown(other.to_string())),
    };
    Ok(Some(input))
}

fn split_first(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (s, ""),
    }
}

/// `dispose 3 ...` picks the third code from the `codes` list.
fn by_index(code: &str) -> Option<&'static str> {
    let n: usize = code.parse().ok()?;
    DispositionCode::ALL
        .get(n.checked_sub(1)?)
        .map(|c| c.code())
}
