//! Tool providers, discovery, and MCP integration.

mod directory;
mod empty;
pub mod errors;
mod host;
mod mcp_host;
mod types;

pub use crate::mcp::{McpClient, McpError};
pub use crate::model::{ToolCall, ToolSpec};
pub use directory::ToolDirectory;
pub use empty::EmptyToolHost;
pub use errors::ToolError;
pub use host::ToolHost;
pub use mcp_host::McpToolHost;
pub use rmcp::model::Tool;
pub use types::ToolArguments;
