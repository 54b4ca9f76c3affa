pub mod submitter;
pub mod webhook;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::CallDetails;
use crate::validation::ValidationError;

/// Outcome codes an agent can assign to a finished call (the standard
/// Vicidial set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispositionCode {
    #[serde(rename = "SALE")]
    Sale,
    #[serde(rename = "CALLBACK")]
    Callback,
    #[serde(rename = "NO SALE")]
    NoSale,
    #[serde(rename = "NOT INTERESTED")]
    NotInterested,
    #[serde(rename = "NO ANSWER")]
    NoAnswer,
    #[serde(rename = "ANSWERING MACHINE")]
    AnsweringMachine,
    #[serde(rename = "BUSY")]
    Busy,
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
    #[serde(rename = "DO NOT CALL")]
    DoNotCall,
    #[serde(rename = "WRONG NUMBER")]
    WrongNumber,
    #[serde(rename = "FOLLOW UP")]
    FollowUp,
    #[serde(rename = "OTHER")]
    Other,
}

impl DispositionCode {
    pub const ALL: [DispositionCode; 12] = [
        Self::Sale,
        Self::Callback,
        Self::NoSale,
        Self::NotInterested,
        Self::NoAnswer,
        Self::AnsweringMachine,
        Self::Busy,
        Self::Disconnected,
        Self::DoNotCall,
        Self::WrongNumber,
        Self::FollowUp,
        Self::Other,
    ];

    /// Wire value sent to the webhook.
    pub fn code(self) -> &'static str {
        match self {
            Self::Sale => "SALE",
            Self::Callback => "CALLBACK",
            Self::NoSale => "NO SALE",
            Self::NotInterested => "NOT INTERESTED",
            Self::NoAnswer => "NO ANSWER",
            Self::AnsweringMachine => "ANSWERING MACHINE",
            Self::Busy => "BUSY",
            Self::Disconnected => "DISCONNECTED",
            Self::DoNotCall => "DO NOT CALL",
            Self::WrongNumber => "WRONG NUMBER",
            Self::FollowUp => "FOLLOW UP",
            Self::Other => "OTHER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sale => "Sale",
            Self::Callback => "Callback",
            Self::NoSale => "No Sale",
            Self::NotInterested => "Not Interested",
            Self::NoAnswer => "No Answer",
            Self::AnsweringMachine => "Answering Machine",
            Self::Busy => "Busy",
            Self::Disconnected => "Disconnected Number",
            Self::DoNotCall => "Do Not Call",
            Self::WrongNumber => "Wrong Number",
            Self::FollowUp => "Follow Up",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for DispositionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Accepts the wire code or the display label, ignoring case, with `_` or
/// `-` standing in for spaces (`no_answer`, `do-not-call`).
impl FromStr for DispositionCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingDisposition);
        }
        let wanted = trimmed.to_ascii_uppercase().replace(['_', '-'], " ");
        Self::ALL
            .into_iter()
            .find(|c| c.code() == wanted || c.label().to_ascii_uppercase() == wanted)
            .ok_or_else(|| ValidationError::UnknownDisposition(trimmed.to_string()))
    }
}

/// A finished call plus the agent's outcome code and notes. Immutable once
/// built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispositionRecord {
    #[serde(flatten)]
    pub call: CallDetails,
    pub disposition: DispositionCode,
    pub call_notes: String,
    pub submitted_at: DateTime<Utc>,
}

impl DispositionRecord {
    /// Validate the agent's form input and stamp the record.
    pub fn new(call: CallDetails, disposition: &str, notes: &str) -> Result<Self, ValidationError> {
        let disposition: DispositionCode = disposition.parse()?;
        let call_notes = notes.trim();
        if call_notes.is_empty() {
            return Err(ValidationError::EmptyNotes);
        }
        Ok(Self {
            call,
            disposition,
            call_notes: call_notes.to_string(),
            submitted_at: Utc::now(),
        })
    }
}

/// Body of `POST /submit-disposition` responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
