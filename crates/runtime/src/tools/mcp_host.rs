//! MCP-backed tool host.

use super::{McpClient, Tool, ToolArguments, ToolCall, ToolError, ToolHost, ToolSpec};
use serde_json::Value;
use tracing::debug;

/// Tool host backed by an MCP server process.
///
/// Tool specs are fetched from the server on every [`ToolHost::list_tools`]
/// call so a changed tool set is visible immediately.
pub struct McpToolHost {
    client: McpClient,
}

impl McpToolHost {
    pub fn new(client: McpClient) -> Self {
        Self { client }
    }

    /// Consume the host and terminate the server process.
    pub async fn shutdown(self) -> Result<(), super::McpError> {
        self.client.shutdown().await
    }
}

impl From<Tool> for ToolSpec {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .map(|d| d.to_string())
                .unwrap_or_default(),
            input_schema: Value::Object((*tool.input_schema).clone()),
        }
    }
}

impl ToolHost for McpToolHost {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let tools = self
            .client
            .list_tools()
            .await
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        debug!(count = tools.len(), "listed MCP tools");
        Ok(tools.into_iter().map(ToolSpec::from).collect())
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let arguments = ToolArguments::try_from(call.input.clone())?;
        let result = self
            .client
            .call_tool(&call.name, arguments.0)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let content = serde_json::to_value(&result.content)
            .map_err(|e| ToolError::Execution(format!("serialize result: {e}")))?;

        if result.is_error == Some(true) {
            return Err(ToolError::Execution(content_text(&content)));
        }
        Ok(content)
    }
}

/// Join the text items of an MCP content list.
///
/// Falls back to the raw JSON when the list holds no text.
fn content_text(content: &Value) -> String {
    let texts: Vec<&str> = content
        .as_array()
        .into_iter()
        .flatten()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        content.to_string()
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_text_joins_text_items() {
        let content = json!([
            {"type": "text", "text": "Access denied"},
            {"type": "image", "data": "...", "mimeType": "image/png"},
            {"type": "text", "text": "path outside allowed directories"},
        ]);
        assert_eq!(
            content_text(&content),
            "Access denied\npath outside allowed directories"
        );
    }

    #[test]
    fn content_text_falls_back_to_json() {
        let content = json!([{"type": "image", "data": "x"}]);
        assert_eq!(content_text(&content), content.to_string());
    }
}
