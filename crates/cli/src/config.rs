//! Configuration loading from chathub.toml.

use hub::{DEFAULT_HUB_CAPACITY, Delivery};
use runtime::invoke::DEFAULT_MAX_TOOL_ROUNDS;
use runtime::providers::DEFAULT_AZURE_API_VERSION;
use runtime::{OpenAiAuth, OpenAiBackend, OpenAiEndpoint};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "chathub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub tool_provider: ToolProviderConfig,
}

/// Where the hub listens and who receives chat output.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub delivery: Delivery,
    /// Events buffered per client; a client further behind loses output.
    pub buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            delivery: Delivery::default(),
            buffer: DEFAULT_HUB_CAPACITY,
        }
    }
}

/// Which API shape the backend speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    Azure,
    OpenAi,
}

/// Completion backend configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Resource endpoint, or base URL for the `openai` flavor.
    pub endpoint: Option<String>,

    /// Azure deployment name, or model name for the `openai` flavor.
    pub deployment: Option<String>,

    pub flavor: Flavor,

    pub api_version: String,

    /// Azure resource key, or OpenAI API key.
    /// Mutually exclusive with bearer_token.
    pub api_key: Option<String>,

    /// Entra ID access token.
    /// Mutually exclusive with api_key.
    pub bearer_token: Option<String>,

    pub max_tool_rounds: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            flavor: Flavor::default(),
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            api_key: None,
            bearer_token: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// How to launch the MCP tool provider.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolProviderConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Default for ToolProviderConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            args: ["-y", "@modelcontextprotocol/server-filesystem", "."]
                .map(String::from)
                .to_vec(),
            working_dir: PathBuf::from(runtime::conversation::DEFAULT_TOOL_SCOPE),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` is normally `std::env::var(..).ok()`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(endpoint) = lookup("AZURE_OPENAI_ENDPOINT") {
            self.backend.endpoint = Some(endpoint);
        }
        if let Some(deployment) = lookup("AZURE_MODEL_DEPLOYMENT") {
            self.backend.deployment = Some(deployment);
        }
        if let Some(key) = lookup("AZURE_OPENAI_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(token) = lookup("AZURE_OPENAI_TOKEN") {
            self.backend.bearer_token = Some(token);
        }
        if let Some(bind) = lookup("CHATHUB_BIND") {
            self.server.bind = bind
                .parse()
                .map_err(|_| ConfigError::InvalidBind(bind))?;
        }
        Ok(())
    }

    /// Build the authentication from config.
    ///
    /// Requires exactly one of api_key or bearer_token to be set.
    pub fn auth(&self) -> Result<OpenAiAuth, ConfigError> {
        let backend = &self.backend;
        match (&backend.api_key, &backend.bearer_token) {
            (Some(key), None) => Ok(match backend.flavor {
                Flavor::Azure => OpenAiAuth::ApiKey(key.clone()),
                Flavor::OpenAi => OpenAiAuth::Bearer(key.clone()),
            }),
            (None, Some(token)) => Ok(OpenAiAuth::Bearer(token.clone())),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousAuth),
            (None, None) => Err(ConfigError::MissingAuth),
        }
    }

    /// Resolve where completion requests go.
    pub fn endpoint(&self) -> Result<OpenAiEndpoint, ConfigError> {
        let backend = &self.backend;
        let endpoint = required(&backend.endpoint, "backend.endpoint", "AZURE_OPENAI_ENDPOINT")?;
        let deployment = required(
            &backend.deployment,
            "backend.deployment",
            "AZURE_MODEL_DEPLOYMENT",
        )?;

        Ok(match backend.flavor {
            Flavor::Azure => OpenAiEndpoint::Azure {
                endpoint,
                deployment,
                api_version: backend.api_version.clone(),
            },
            Flavor::OpenAi => OpenAiEndpoint::Compatible {
                base_url: endpoint,
                model: deployment,
            },
        })
    }

    /// Build the completion backend.
    pub fn backend(&self) -> Result<OpenAiBackend, ConfigError> {
        Ok(OpenAiBackend::builder(self.endpoint()?, self.auth()?).build())
    }
}

fn required(
    value: &Option<String>,
    field: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(ConfigError::Missing { field, env }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{field} is not configured: set it in the config file or via {env}")]
    Missing {
        field: &'static str,
        env: &'static str,
    },

    #[error("invalid bind address: {0}")]
    InvalidBind(String),

    #[error(
        "authentication not configured: set backend.api_key or backend.bearer_token \
         (AZURE_OPENAI_API_KEY / AZURE_OPENAI_TOKEN)"
    )]
    MissingAuth,

    #[error(
        "ambiguous authentication: set either backend.api_key OR backend.bearer_token, not both"
    )]
    AmbiguousAuth,
}
