use thiserror::Error;

/// Failures that end a chat turn.
///
/// Each variant carries the message text that is shown to the user, so the
/// caller never needs to inspect the lower-level error it came from.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool provider could not be reached or returned a malformed tool list.
    #[error("tool provider unavailable: {0}")]
    ToolProviderUnavailable(String),

    /// The completion backend failed before or during streaming.
    #[error("completion failed: {0}")]
    CompletionFailed(String),

    /// The turn was cancelled before the stream was exhausted.
    #[error("turn cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
