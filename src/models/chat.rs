use serde::{ Serialize, Deserialize };

use super::relay::RelayEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
}

/// Append-only transcript kept by the browser client.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub entries: Vec<ConversationEntry>,
}

impl Conversation {
    pub fn new(system_message: impl Into<String>) -> Self {
        Self {
            entries: vec![ConversationEntry { role: Role::System, text: system_message.into() }],
        }
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.entries.push(ConversationEntry { role, text: text.into() });
    }

    /// Renders the transcript plus the next question as a single prompt.
    pub fn compose_prompt(&self, question: &str) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            let prefix = match entry.role {
                Role::User => "Q:",
                Role::Assistant => "A:",
                Role::System => "",
            };
            result.push_str(&format!("{} {}\n", prefix, entry.text));
        }
        result.push_str(&format!("Q: {}", question));
        result
    }
}

/// Collects streamed fragments into the assistant's reply.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    text: String,
    finished: bool,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event. Returns the completed assistant entry on `Done`.
    /// Events after a terminal one are ignored.
    pub fn accept(&mut self, event: &RelayEvent) -> Option<ConversationEntry> {
        if self.finished {
            return None;
        }
        match event {
            RelayEvent::Fragment(text) => {
                self.text.push_str(text);
                None
            }
            RelayEvent::Done => {
                self.finished = true;
                Some(ConversationEntry {
                    role: Role::Assistant,
                    text: std::mem::take(&mut self.text),
                })
            }
            RelayEvent::Error(_) => {
                self.finished = true;
                None
            }
        }
    }

    pub fn partial(&self) -> &str {
        &self.text
    }
}
