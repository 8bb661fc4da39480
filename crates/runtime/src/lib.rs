//! chathub runtime: completion streaming, tool discovery, and conversation assembly.
//!
//! This crate holds everything a chat turn needs apart from the real-time
//! transport: the completion backend, the MCP tool provider, and the
//! components that tie them together.
//!
//! # Overview
//!
//! - **ToolDirectory**: lists the tool provider's current tools, uncached.
//! - **Assembler**: turns untyped client history into typed messages.
//! - **Relay**: drives a streaming completion and forwards each update.
//! - **FunctionInvoker**: a [`ChatClient`] that runs tools the model asks for
//!   between backend rounds.
//! - **OpenAiBackend**: an OpenAI-compatible / Azure OpenAI streaming backend.
//! - **McpClient**: a client for a stdio MCP server process.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use runtime::{
//!     Assembler, FunctionInvoker, McpClient, McpToolHost, OpenAiAuth, OpenAiBackend,
//!     OpenAiEndpoint, Relay, ToolDirectory,
//! };
//!
//! # async fn example(sink: &mut impl runtime::UpdateSink) -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = OpenAiEndpoint::azure("https://res.openai.azure.com", "gpt-4o");
//! let backend = OpenAiBackend::builder(endpoint, OpenAiAuth::ApiKey("...".into())).build();
//! let mcp = McpClient::spawn("npx", ["-y", "@modelcontextprotocol/server-filesystem", "."], None).await?;
//! let host = Arc::new(McpToolHost::new(mcp));
//!
//! let directory = ToolDirectory::new(Arc::clone(&host));
//! let relay = Relay::new(FunctionInvoker::new(backend, host));
//!
//! let tools = directory.list_tools().await?;
//! let messages = Assembler::default().assemble(&[], "list files");
//! let reply = relay
//!     .stream(messages, tools, &Default::default(), sink)
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod conversation;
mod error;
pub mod invoke;
pub mod mcp;
pub mod model;
pub mod providers;
pub mod relay;
pub mod tools;

pub use conversation::{Assembler, HistoryEntry, HistoryRole};
pub use error::{Error, Result};
pub use invoke::FunctionInvoker;
pub use mcp::{McpClient, McpError};
pub use model::{
    Backend, ChatClient, Message, ModelError, Part, Role, ToolCall, ToolSpec, Update,
};
pub use providers::{OpenAiAuth, OpenAiBackend, OpenAiEndpoint};
pub use relay::{Relay, UpdateSink};
pub use tools::{EmptyToolHost, McpToolHost, ToolDirectory, ToolError, ToolHost};
