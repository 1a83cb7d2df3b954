//! Configuration inspection commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, WorkerKind};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,
    /// Check the configuration and summarize the worker roster
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("Failed to render configuration: {e}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub workers: usize,
    pub enabled_workers: usize,
    pub http_workers: usize,
    pub echo_workers: usize,
}

impl ConfigValidateOutput {
    pub fn from_config(config: &Config) -> Self {
        let enabled: Vec<_> = config.workers.iter().filter(|w| w.enabled).collect();
        Self {
            valid: true,
            workers: config.workers.len(),
            enabled_workers: enabled.len(),
            http_workers: enabled.iter().filter(|w| w.kind == WorkerKind::Http).count(),
            echo_workers: enabled.iter().filter(|w| w.kind == WorkerKind::Echo).count(),
        }
    }
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Configuration is valid.".to_string()];
        lines.push(format!(
            "  Workers:          {} ({} enabled)",
            self.workers, self.enabled_workers
        ));
        lines.push(format!("  HTTP workers:     {}", self.http_workers));
        lines.push(format!("  Echo workers:     {}", self.echo_workers));
        if self.enabled_workers == 0 {
            lines.push("  Warning: no enabled workers; `chorus run` will fail.".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Loading already validated the configuration; these commands only report.
pub fn execute(args: ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => output(
            &ConfigShowOutput {
                config: config.clone(),
            },
            json_mode,
        ),
        ConfigCommands::Validate => output(&ConfigValidateOutput::from_config(config), json_mode),
    }
    Ok(())
}
