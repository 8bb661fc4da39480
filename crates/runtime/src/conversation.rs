//! Conversation assembly from client-supplied history.
//!
//! Clients send history as loosely-typed JSON records. Validation happens
//! here and nowhere else: records that do not carry a non-empty string
//! `role` and `content` are dropped, never reported as errors.

use crate::model::Message;
use serde::Deserialize;
use serde_json::Value;

/// Directory the tool provider is scoped to when nothing else is configured.
pub const DEFAULT_TOOL_SCOPE: &str = "/workspace/test-files";

/// Instruction text used when a conversation starts without history.
pub fn default_instructions(scope: &str) -> String {
    format!(
        "You are a helpful assistant with access to file operations through MCP tools. \
         The filesystem server can access the {scope} directory. \
         When users ask to list or read files, use the available tools such as \
         list_directory and read_file. \
         If a tool reports a permission error, help the user stay within the allowed directory."
    )
}

/// Speaker of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    /// Only `"user"` (any case) is the user; every other role is the assistant.
    pub fn parse(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

/// A history record that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

#[derive(Deserialize)]
struct RawEntry {
    role: String,
    content: String,
}

impl HistoryEntry {
    /// Validate one untyped record, or `None` when it is malformed.
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = RawEntry::deserialize(value).ok()?;
        if raw.role.is_empty() || raw.content.is_empty() {
            return None;
        }
        Some(Self {
            role: HistoryRole::parse(&raw.role),
            content: raw.content,
        })
    }

    pub fn into_message(self) -> Message {
        match self.role {
            HistoryRole::User => Message::user(self.content),
            HistoryRole::Assistant => Message::assistant(self.content),
        }
    }
}

/// Builds the message sequence for one chat turn.
#[derive(Debug, Clone)]
pub struct Assembler {
    instructions: String,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::for_scope(DEFAULT_TOOL_SCOPE)
    }
}

impl Assembler {
    /// Use custom instruction text for history-less conversations.
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    /// Use the default instructions for tools scoped to `scope`.
    pub fn for_scope(scope: &str) -> Self {
        Self::new(default_instructions(scope))
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Convert raw history plus the new user message into a typed sequence.
    ///
    /// The result is never empty and always ends with the new user message.
    /// A system message is prepended only when no history record survives
    /// validation.
    pub fn assemble(&self, raw_history: &[Value], new_user_message: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = raw_history
            .iter()
            .filter_map(HistoryEntry::from_value)
            .map(HistoryEntry::into_message)
            .collect();

        if messages.is_empty() {
            messages.push(Message::system(self.instructions.clone()));
        }

        messages.push(Message::user(new_user_message));
        messages
    }
}
