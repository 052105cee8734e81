use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::borrow::Cow;
use uuid::Uuid;

use crate::error::RelayError;

/// A submitted generation: which model to run and what to ask it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub submitted_at: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Result<Self, RelayError> {
        let model = model.into();
        let prompt = prompt.into();
        if model.is_empty() || prompt.is_empty() {
            return Err(RelayError::InvalidInput("Model and prompt are required".into()));
        }
        Ok(Self { model, prompt, submitted_at: Utc::now() })
    }
}

/// Body of `POST /api/query`. Fields are optional so a missing one maps to 400, not a rejection.
#[derive(Debug, Default, Deserialize)]
pub struct QueryBody {
    pub model: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub message: String,
    pub session_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub session: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchDocumentBody {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchDocumentResponse {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeDocumentBody {
    pub text: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeDocumentResponse {
    pub response: String,
}

pub const DONE_MARKER: &str = "[DONE]";
pub const ERROR_MARKER: &str = "[ERROR]";

/// One event delivered to a streaming client. `Done` and `Error` are terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    Fragment(String),
    Done,
    Error(String),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Done | RelayEvent::Error(_))
    }

    /// Payload of the `data:` field. CR and CRLF become LF since SSE cannot carry a bare CR.
    pub fn wire_data(&self) -> Cow<'_, str> {
        match self {
            RelayEvent::Fragment(text) if text.contains('\r') => {
                Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
            }
            RelayEvent::Fragment(text) => Cow::Borrowed(text),
            RelayEvent::Done => Cow::Borrowed(DONE_MARKER),
            RelayEvent::Error(_) => Cow::Borrowed(ERROR_MARKER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_invalid() {
        assert!(matches!(GenerationRequest::new("", "hi"), Err(RelayError::InvalidInput(_))));
        assert!(matches!(GenerationRequest::new("llama2", ""), Err(RelayError::InvalidInput(_))));
        assert!(GenerationRequest::new("llama2", "hi").is_ok());
    }

    #[test]
    fn whitespace_prompt_is_accepted() {
        let request = GenerationRequest::new("llama2", " ").unwrap();
        assert_eq!(request.prompt, " ");
        assert!(request.submitted_at <= Utc::now());
    }

    #[test]
    fn terminal_markers() {
        assert_eq!(RelayEvent::Done.wire_data(), "[DONE]");
        assert_eq!(RelayEvent::Error("socket closed".into()).wire_data(), "[ERROR]");
        assert!(RelayEvent::Done.is_terminal());
        assert!(!RelayEvent::Fragment("He".into()).is_terminal());
    }

    #[test]
    fn carriage_returns_are_normalized() {
        let event = RelayEvent::Fragment("a\r\nb\rc".into());
        assert_eq!(event.wire_data(), "a\nb\nc");
        assert_eq!(RelayEvent::Fragment(" llo".into()).wire_data(), " llo");
    }
}
