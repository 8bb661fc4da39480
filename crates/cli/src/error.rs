//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The `.env` file exists but could not be loaded.
    #[error("failed to load .env: {0}")]
    Env(#[from] dotenvy::Error),

    /// The tool provider process could not be started or stopped.
    #[error("tool provider: {0}")]
    ToolProvider(String),

    /// An error occurred in the runtime layer.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    /// The hub server failed.
    #[error(transparent)]
    Server(#[from] hub::ServerError),
}

pub type Result<T> = std::result::Result<T, Error>;
