//! Shared store server binary

use clap::{Parser, Subcommand};
use revealpoll::common::{Config, StorageKind};
use revealpoll::PollServer;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "revealpoll-server")]
#[command(about = "Shared tally store for revealpoll")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the shared store
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// Storage backend: memory, file or sled
        #[arg(long)]
        storage: Option<StorageKind>,

        /// Data file (file storage) or directory (sled)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Accept writes that lower a counter
        #[arg(long)]
        allow_regressions: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file/env, then override with CLI arguments
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            storage,
            data,
            allow_regressions,
        } => {
            let mut server_config = config.server;
            if let Some(bind) = bind {
                server_config.bind_addr = bind.parse()?;
            }
            if let Some(storage) = storage {
                server_config.storage = storage;
            }
            if let Some(data) = data {
                server_config.data_path = data;
            }
            if allow_regressions {
                server_config.reject_regressions = false;
            }

            PollServer::new(server_config).serve().await?;
        }
    }

    Ok(())
}
