use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use thiserror::Error;

use crate::domain::models::config::{Config, WorkerKind};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_workers: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    #[error("Invalid {field}: must be greater than 0 seconds")]
    InvalidTimeout { field: &'static str },

    #[error("Invalid retention_limit: {0}. Must be at least 1")]
    InvalidRetentionLimit(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Worker id cannot be empty")]
    EmptyWorkerId,

    #[error("Duplicate worker id: {0}")]
    DuplicateWorkerId(String),

    #[error("Http worker '{0}' has no endpoint")]
    MissingEndpoint(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .chorus/config.yaml (project config)
    /// 3. .chorus/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CHORUS_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".chorus/config.yaml"))
            .merge(Yaml::file(".chorus/local.yaml"))
            .merge(Env::prefixed("CHORUS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CHORUS_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.session.max_concurrent_workers == 0 {
            return Err(ConfigError::InvalidConcurrency(
                config.session.max_concurrent_workers,
            ));
        }

        let timeouts = [
            ("session.worker_timeout_secs", config.session.worker_timeout_secs),
            ("session.max_duration_secs", config.session.max_duration_secs),
            ("challenge.worker_timeout_secs", config.challenge.worker_timeout_secs),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::InvalidTimeout { field });
        }

        if config.pipeline.retention_limit == 0 {
            return Err(ConfigError::InvalidRetentionLimit(
                config.pipeline.retention_limit,
            ));
        }

        if config.events.channel_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        // Validate worker roster
        let mut seen = HashSet::new();
        for worker in &config.workers {
            if worker.id.trim().is_empty() {
                return Err(ConfigError::EmptyWorkerId);
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(ConfigError::DuplicateWorkerId(worker.id.clone()));
            }
            let has_endpoint = worker
                .endpoint
                .as_deref()
                .is_some_and(|e| !e.trim().is_empty());
            if worker.enabled && worker.kind == WorkerKind::Http && !has_endpoint {
                return Err(ConfigError::MissingEndpoint(worker.id.clone()));
            }
        }

        Ok(())
    }
}
