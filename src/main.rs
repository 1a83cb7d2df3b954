//! Chorus CLI entry point.

use anyhow::Context;
use clap::Parser;

use chorus::cli::commands::{self, load_config};
use chorus::cli::{Cli, Commands};
use chorus::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let result: anyhow::Result<()> = async {
        let config = load_config(cli.config.as_deref())?;
        let _logger = LoggerImpl::init(&LogConfig::from_settings(&config.logging))
            .context("Failed to initialize logging")?;

        match cli.command {
            Commands::Run(args) => commands::run::execute(args, &config, json).await,
            Commands::Config(args) => commands::config::execute(args, &config, json),
        }
    }
    .await;

    if let Err(err) = result {
        chorus::cli::handle_error(err, json);
    }
}
