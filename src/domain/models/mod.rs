//! Domain models for the chorus pipeline.

pub mod artifact;
pub mod collaboration;
pub mod config;
pub mod implementation;
pub mod job;
pub mod proposal;
pub mod task_descriptor;
pub mod worker;

pub use artifact::{Artifact, ArtifactRecord, Candidate};
pub use collaboration::{
    Consensus, Debate, SessionOutcome, SessionPhase, Theme, ThemeSummary, VoteTally, VoteWinner,
};
pub use config::{
    ChallengeSettings, Config, DeployConfig, EventsConfig, LoggingConfig, PipelineConfig,
    SessionSettings, WorkerConfig, WorkerKind,
};
pub use implementation::{Implementation, ImplementationStatus, RoundOutcome, RoundStatus};
pub use job::{Job, JobOptions, JobResult, JobStats, JobStatus, StepEntry};
pub use proposal::Proposal;
pub use task_descriptor::{PipelineVariant, TaskDescriptor};
pub use worker::{Persona, WorkerHandle};
