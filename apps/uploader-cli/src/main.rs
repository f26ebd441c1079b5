//! chunkup command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/chunkup/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Endpoint base URL, overrides the configuration file
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Use a process-local endpoint instead of the network
    #[arg(long)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload local files, resuming partial uploads the endpoint holds
    Upload {
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Remote directory to upload into
        #[arg(short, long, default_value = "")]
        dest: String,
    },

    /// List partial uploads held by the endpoint
    List,

    /// Discard a partial upload on the endpoint
    Delete {
        /// Remote path of the upload
        path: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunkup");

    let mut config = config::CliConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    config.uploader.validate()?;
    tracing::info!(endpoint = %config.endpoint, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))
}
