mod config;
mod error;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hub::{ChatEndpoint, HubState};
use runtime::{Assembler, FunctionInvoker, McpClient, McpToolHost, Relay, ToolDirectory};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use config::{Config, DEFAULT_CONFIG_FILE, ToolProviderConfig};
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "chathub")]
#[command(about = "A real-time chat hub with MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the chat hub over WebSocket
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// List the tools the configured tool provider offers
    Tools,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "chathub exited with an error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
        Some(Commands::Tools) => cmd_tools(config).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    match dotenvy::dotenv() {
        Ok(env_file) => debug!(path = %env_file.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let mut config = if path.exists() {
        info!(path = %path.display(), "loaded configuration");
        Config::load(path)?
    } else {
        info!(path = %path.display(), "no configuration file; using defaults");
        Config::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

async fn cmd_serve(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let backend = config.backend()?;
    info!(backend = %backend, "completion backend configured");

    let host = Arc::new(spawn_tool_provider(&config.tool_provider).await?);
    let client = FunctionInvoker::new(backend, Arc::clone(&host))
        .max_rounds(config.backend.max_tool_rounds);
    let scope = config.tool_provider.working_dir.display().to_string();
    let endpoint = ChatEndpoint::new(
        ToolDirectory::new(Arc::clone(&host)),
        Assembler::for_scope(&scope),
        Relay::new(client),
    );

    let state = HubState::new(endpoint, config.server.delivery).buffer(config.server.buffer);
    let shutdown = state.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });

    let addr = bind.unwrap_or(config.server.bind);
    info!(%addr, delivery = ?config.server.delivery, "starting chat hub");
    let served = hub::serve(state, addr).await;

    stop_tool_provider(host).await;
    served?;
    Ok(())
}

async fn cmd_tools(config: Config) -> Result<()> {
    let host = Arc::new(spawn_tool_provider(&config.tool_provider).await?);
    let tools = ToolDirectory::new(Arc::clone(&host)).list_tools().await;
    stop_tool_provider(host).await;

    let tools = tools?;
    if tools.is_empty() {
        println!("No tools offered.");
        return Ok(());
    }

    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tool in tools {
        println!("{:<width$}  {}", tool.name, tool.description);
    }
    Ok(())
}

async fn spawn_tool_provider(config: &ToolProviderConfig) -> Result<McpToolHost> {
    let working_dir = config.working_dir.as_path();
    let client = McpClient::spawn(&config.command, &config.args, Some(working_dir))
        .await
        .map_err(|e| Error::ToolProvider(format!("failed to start {}: {e}", config.command)))?;
    Ok(McpToolHost::new(client))
}

async fn stop_tool_provider(host: Arc<McpToolHost>) {
    match Arc::try_unwrap(host) {
        Ok(host) => {
            if let Err(e) = host.shutdown().await {
                warn!(error = %e, "tool provider did not shut down cleanly");
            }
        }
        Err(_) => debug!("tool provider still referenced by running turns; dropping"),
    }
}
