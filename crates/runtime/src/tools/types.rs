//! Tool-related types.

use super::ToolError;
use serde_json::{Map, Value};

/// Arguments for a tool call, validated to be a JSON object (or absent).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(pub Option<Map<String, Value>>);

impl TryFrom<Value> for ToolArguments {
    type Error = ToolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self(None)),
            Value::Object(map) => Ok(Self(Some(map))),
            Value::String(raw) => Err(ToolError::InvalidInput(format!(
                "arguments are not a JSON object: {raw}"
            ))),
            other => Err(ToolError::InvalidInput(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}
