//! Tool host trait.

use crate::model::{ToolCall, ToolSpec};
use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;

/// Trait for tool providers.
///
/// Implementations report the tools currently on offer and execute calls.
/// This is the boundary between the completion loop and side effects.
/// Listing is never cached here: every call asks the provider again.
pub trait ToolHost: Send + Sync {
    /// Query the provider for its current tools.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolSpec>, ToolError>> + Send;

    /// Execute a tool call.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;
}
