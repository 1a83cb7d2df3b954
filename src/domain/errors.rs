//! Domain errors for the chorus pipeline.

use thiserror::Error;
use uuid::Uuid;

use super::models::job::JobStatus;

/// Pipeline-level errors.
///
/// Failures local to a single worker never surface as `Err` past the
/// session/round boundary. A failed implementation row carries the rendered
/// `WorkerFailure` as its message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Worker {worker_id} failed: {reason}")]
    WorkerFailure { worker_id: String, reason: String },

    #[error("No workers available: every worker failed or none were configured")]
    NoWorkersAvailable,

    #[error("Collaboration exceeded its time budget of {timeout_secs}s")]
    JudgmentTimeout { timeout_secs: u64 },

    #[error("Artifact persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("Deployment failed: {0}")]
    DeploymentFailure(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("Job was cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by a worker transport before the worker client absorbs them.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Worker unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::InvalidResponse(err.to_string())
    }
}
