//! Memo MCP - encrypted memories for AI agents
//!
//! Usage:
//!   memo-mcp              - Serve MCP over stdio
//!   memo-mcp --version    - Print the version

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use memo_client::MemoClient;
use memo_mcp::{McpServer, MemoryTools, ServerConfig};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "memo-mcp")]
#[command(version)]
#[command(about = "MCP server for the end-to-end encrypted memory store", long_about = None)]
struct Cli {
    /// Private key file (overrides MEMO_PRIVATE_KEY_PATH)
    #[arg(long)]
    key_path: Option<PathBuf>,

    /// Memory service URL (overrides MEMO_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Load variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let mut config = ServerConfig::from_env()?;
    if let Some(path) = cli.key_path {
        config.private_key_path = path;
    }
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }

    // stdout carries the protocol; logs go to stderr.
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let keys = config.load_keys()?;
    let client = MemoClient::new(config.memo_config(), keys)
        .context("Failed to create memory client")?;

    info!(version = env!("CARGO_PKG_VERSION"), "memo-mcp starting");

    let server = McpServer::new(MemoryTools::new(client, config.debug));
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
