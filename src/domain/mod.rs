//! Domain layer for the chorus pipeline
//!
//! This module contains core models, port traits and the error taxonomy.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{PipelineError, PipelineResult, WorkerError};
