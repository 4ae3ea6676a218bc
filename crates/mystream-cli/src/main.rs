use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};
use config::load_settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the event stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("mystream=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.config),
        Commands::Check { connect } => {
            let settings = load_settings(&cli.config)?;
            commands::cmd_check(settings, connect).await
        }
        Commands::Run { limit } => {
            let settings = load_settings(&cli.config)?;
            commands::cmd_run(settings, limit).await
        }
    }
}
