//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces the pipeline consumes:
//! - Worker: one external text-generation endpoint
//! - ArtifactStore: best-effort artifact persistence
//! - Deployer: artifact deployment
//!
//! Concrete implementations live in `crate::adapters`.

pub mod artifact_store;
pub mod deployer;
pub mod null_artifact_store;
pub mod worker;

pub use artifact_store::ArtifactStore;
pub use deployer::Deployer;
pub use null_artifact_store::NullArtifactStore;
pub use worker::Worker;
