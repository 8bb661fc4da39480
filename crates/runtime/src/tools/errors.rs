use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while listing or executing tools.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tool provider unreachable: {0}")]
    Unavailable(String),
    #[error("execution failed: {0}")]
    Execution(String),
}
