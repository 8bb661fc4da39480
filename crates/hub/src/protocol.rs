//! JSON messages exchanged over the hub socket.
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! ```text
//! -> {"type":"sendMessage","user":"ana","message":"list files","history":[]}
//! <- {"type":"typingIndicator","active":true}
//! <- {"type":"receiveMessageStream","text":"The dir"}
//! <- {"type":"typingIndicator","active":false}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sender name used for notifications that do not come from the model.
pub const SYSTEM_SENDER: &str = "System";

/// Inbound client invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start a chat turn.
    SendMessage {
        user: String,
        message: String,
        /// Prior turns as loosely-typed `{role, content}` records.
        #[serde(default)]
        history: Vec<Value>,
    },
    /// Ask for the names of the tools currently on offer.
    GetAvailableTools,
}

/// Outbound notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    TypingIndicator { active: bool },
    ReceiveMessageStream { text: String },
    ReceiveMessage { sender: String, text: String },
    ReceiveAvailableTools { names: Vec<String> },
}

impl ServerEvent {
    pub fn typing(active: bool) -> Self {
        Self::TypingIndicator { active }
    }

    pub fn fragment(text: impl Into<String>) -> Self {
        Self::ReceiveMessageStream { text: text.into() }
    }

    /// A message from the system sender, used for error reports.
    pub fn system(text: impl Into<String>) -> Self {
        Self::ReceiveMessage {
            sender: SYSTEM_SENDER.to_string(),
            text: text.into(),
        }
    }

    pub fn tools(names: Vec<String>) -> Self {
        Self::ReceiveAvailableTools { names }
    }
}
