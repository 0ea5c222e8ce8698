//! StockChat - terminal client for the stock analysis AI chat service
//!
#![doc = "StockChat - terminal client for the stock analysis AI chat service"]
#![doc = "Main entry point for the StockChat application."]

use anyhow::Result;

use stockchat::cli::{Cli, Commands};
use stockchat::commands;
use stockchat::config::Config;
use stockchat::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_logging(cli.verbose, cli.json_logs)?;

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { session, .. } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(s) = &session {
                tracing::debug!("Resuming session: {}", s);
            }
            commands::chat::run_chat(config, session).await?;
            Ok(())
        }
        Commands::Ask {
            prompt, session, ..
        } => {
            tracing::info!("Sending one-shot question");
            commands::ask::run_ask(config, &prompt, session).await?;
            Ok(())
        }
        Commands::History { session, .. } => {
            tracing::info!("Fetching history for session {}", session);
            commands::history::show_history(config, &session).await?;
            Ok(())
        }
        Commands::Endpoint { session, .. } => {
            commands::endpoint::print_endpoint(&config, session.as_deref())?;
            Ok(())
        }
    }
}
