//! Chorus - multi-worker fan-out and consensus pipeline
//!
//! Chorus sends one structured task to many independent workers, collects
//! their answers concurrently, and turns them into a single artifact, either
//! by scoring competing implementations (challenge round) or by debating,
//! clustering and voting on proposals (collaboration session).
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, ports and the error taxonomy
//! - **Service Layer** (`services`): Worker pool, scoring, sessions, rounds and the job orchestrator
//! - **Adapter Layer** (`adapters`): HTTP and scripted workers, artifact stores, deployers
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use chorus::{JobOptions, OrchestratorConfig, PipelineOrchestrator, TaskDescriptor, WorkerRoster};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = PipelineOrchestrator::new(roster, OrchestratorConfig::default());
//!     let job_id = orchestrator
//!         .submit(TaskDescriptor::new("create", "component"), JobOptions::default(), Default::default())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::{FileDeployer, HttpWorker, InMemoryArtifactStore, ScriptedWorker, WorkerRoster};
pub use domain::errors::{PipelineError, PipelineResult, WorkerError};
pub use domain::models::{
    Artifact, Candidate, Config, Job, JobOptions, JobResult, JobStats, JobStatus, Persona,
    PipelineVariant, Proposal, TaskDescriptor, WorkerHandle,
};
pub use domain::ports::{ArtifactStore, Deployer, Worker};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    EventBus, EventPayload, OrchestratorConfig, PipelineOrchestrator, UnifiedEvent,
};
