//! Infrastructure layer module
//!
//! Ambient concerns shared by the CLI and embedders:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;
