//! Completion protocol types and backend traits.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, ChatClient, Message, ModelRequest, Part, Role, ToolCall, ToolCallDelta, ToolResult,
    ToolSpec, Update, UpdateStream,
};
