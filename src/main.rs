//! # Search Relay CLI (`relay`)
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay serve` | Run the Telegram bot and the health probe |
//! | `relay query "<text>"` | Run one query and print the messages |
//!
//! Secrets come from the environment (`BOT_TOKEN`, `API_TOKEN`); `PORT`
//! enables the health probe on `0.0.0.0:<PORT>`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use search_relay::config::{self, Config};
use search_relay::dispatch::Dispatcher;
use search_relay::gateway::ConsoleGateway;
use search_relay::models::ChatId;
use search_relay::upstream::HttpSearchBackend;
use search_relay::{bot, health, logging};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "./config/relay.toml";

/// Search Relay: relays chat search queries to an upstream API.
#[derive(Parser)]
#[command(name = "relay", version, about = "Relays chat search queries to an upstream search API")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional at the default location; every setting has a default and
    /// secrets are normally supplied through the environment.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot (and the health probe when configured).
    ///
    /// Requires a bot token. Stops on Ctrl-C.
    Serve,

    /// Run one query through the pipeline and print the messages.
    Query {
        /// Phone number, email, or any other search text.
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let required = cli.config != PathBuf::from(DEFAULT_CONFIG);
    let cfg = config::load_config(&cli.config, required)?;
    logging::init_logging(&cfg.logging);

    match cli.command {
        Commands::Serve => serve(&cfg).await?,
        Commands::Query { text } => {
            let backend = Arc::new(HttpSearchBackend::new(cfg.upstream.clone())?);
            let dispatcher = Dispatcher::new(backend, Arc::new(ConsoleGateway));
            let outcome = dispatcher.handle(ChatId(0), &text).await;
            info!(?outcome, "query finished");
        }
    }

    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    // Bind before starting the bot so a busy port fails the process.
    if let Some(bind) = &cfg.health.bind {
        let listener = health::bind(bind).await?;
        tokio::spawn(async move {
            if let Err(e) = health::serve(listener).await {
                error!(error = %e, "health server stopped");
            }
        });
    }

    tokio::select! {
        result = bot::run_bot(cfg) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
