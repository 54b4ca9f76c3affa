use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Default spoken line when handing the caller to another number.
pub const DEFAULT_TRANSFER_MESSAGE: &str = "Transferring your call now";

/// A mid-call command posted to the call's control URL.
///
/// Serializes to the provider's wire shape, e.g. `{"type":"say","content":"..."}`
/// or `{"type":"end-call"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlCommand {
    Say {
        content: String,
    },
    AddMessage {
        message: ConversationMessage,
        #[serde(rename = "triggerResponseEnabled")]
        trigger_response_enabled: bool,
    },
    Transfer {
        destination: TransferDestination,
        content: String,
    },
    #[serde(rename = "control")]
    AssistantControl {
        control: AssistantControl,
    },
    EndCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    #[default]
    System,
    User,
    Assistant,
}

impl std::str::FromStr for MessageRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransferDestination {
    Number { number: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssistantControl {
    MuteAssistant,
    UnmuteAssistant,
    SayFirstMessage,
}

impl ControlCommand {
    pub fn say(content: impl Into<String>) -> Self {
        Self::Say {
            content: content.into(),
        }
    }

    pub fn add_message(role: MessageRole, content: impl Into<String>) -> Self {
        Self::AddMessage {
            message: ConversationMessage {
                role,
                content: content.into(),
            },
            trigger_response_enabled: true,
        }
    }

    pub fn transfer(number: impl Into<String>, content: Option<String>) -> Self {
        Self::Transfer {
            destination: TransferDestination::Number {
                number: number.into(),
            },
            content: content.unwrap_or_else(|| DEFAULT_TRANSFER_MESSAGE.to_string()),
        }
    }

    pub fn control(control: AssistantControl) -> Self {
        Self::AssistantControl { control }
    }

    /// Stable label for the command, used to key in-flight tracking and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Say { .. } => "say",
            Self::AddMessage { .. } => "add-message",
            Self::Transfer { .. } => "transfer",
            Self::AssistantControl { control } => match control {
                AssistantControl::MuteAssistant => "mute-assistant",
                AssistantControl::UnmuteAssistant => "unmute-assistant",
                AssistantControl::SayFirstMessage => "say-first-message",
            },
            Self::EndCall => "end-call",
        }
    }

    /// Reject commands whose text fields are blank before they reach the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let blank = match self {
            Self::Say { content } => content.trim().is_empty(),
            Self::AddMessage { message, .. } => message.content.trim().is_empty(),
            Self::Transfer { destination, .. } => match destination {
                TransferDestination::Number { number } => number.trim().is_empty(),
            },
            Self::AssistantControl { .. } | Self::EndCall => false,
        };
        if blank {
            return Err(ValidationError::EmptyCommandContent(self.kind()));
        }
        Ok(())
    }
}
