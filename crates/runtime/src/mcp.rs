//! MCP (Model Context Protocol) client integration.
//!
//! This module launches the tool-provider process using the official rmcp SDK
//! and talks to it over stdio.
//!
//! # Example
//!
//! ```ignore
//! use runtime::McpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = McpClient::spawn(
//!     "npx",
//!     ["-y", "@modelcontextprotocol/server-filesystem", "."],
//!     Some("/workspace/test-files".as_ref()),
//! )
//! .await?;
//!
//! let tools = client.list_tools().await?;
//! for tool in &tools {
//!     println!("Tool: {}", tool.name);
//! }
//! # Ok(())
//! # }
//! ```

use rmcp::{
    ServiceExt,
    model::{CallToolRequestParams, CallToolResult, Tool},
    service::RunningService,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

/// Error type for MCP operations.
pub type McpError = Box<dyn std::error::Error + Send + Sync>;

/// An MCP client connected to a server process.
///
/// The process lives as long as the client; there is no restart on crash.
pub struct McpClient {
    service: Arc<RunningService<rmcp::service::RoleClient, ()>>,
}

impl McpClient {
    /// Spawn an MCP server and connect to it.
    ///
    /// # Arguments
    ///
    /// * `command` - The command to run (e.g., "npx")
    /// * `args` - Arguments to pass to the command
    /// * `working_dir` - Directory the server runs in, scoping its filesystem access
    pub async fn spawn(
        command: impl AsRef<str>,
        args: impl IntoIterator<Item = impl AsRef<str>>,
        working_dir: Option<&Path>,
    ) -> Result<Self, McpError> {
        let command_str = command.as_ref().to_string();
        let args_vec: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();

        let transport = TokioChildProcess::new(Command::new(&command_str).configure(|cmd| {
            cmd.args(&args_vec);
            if let Some(dir) = working_dir {
                cmd.current_dir(dir);
            }
        }))?;

        let service = ().serve(transport).await?;
        info!(
            command = %command_str,
            args = ?args_vec,
            working_dir = ?working_dir,
            "tool provider connected"
        );

        Ok(Self {
            service: Arc::new(service),
        })
    }

    /// List available tools from the server.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let response = self.service.list_tools(Default::default()).await?;
        Ok(response.tools)
    }

    /// Call a tool with the given name and arguments.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult, McpError> {
        let params = CallToolRequestParams {
            name: name.into().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = self.service.call_tool(params).await?;
        Ok(result)
    }

    /// Shutdown the client and terminate the server process.
    ///
    /// When other handles to the service are still alive the process is
    /// left to be cancelled when the last one drops.
    pub async fn shutdown(self) -> Result<(), McpError> {
        if let Ok(service) = Arc::try_unwrap(self.service) {
            let reason = service.cancel().await?;
            info!(?reason, "tool provider stopped");
        }
        Ok(())
    }
}
