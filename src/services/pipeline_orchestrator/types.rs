//! Public types for the pipeline orchestrator.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{Config, Job, RoundOutcome, SessionOutcome};
use crate::services::challenge_round::RoundConfig;
use crate::services::collaboration_session::SessionConfig;

/// Reason recorded on every cancelled job.
pub const CANCEL_REASON: &str = "Cancelled by user";

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Artifact kinds that run a collaboration session.
    pub collaborative_kinds: Vec<String>,
    /// Number of terminal jobs kept by `cleanup`.
    pub retention_limit: usize,
    pub session: SessionConfig,
    pub round: RoundConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collaborative_kinds: config.pipeline.collaborative_kinds.clone(),
            retention_limit: config.pipeline.retention_limit,
            session: SessionConfig::from_settings(&config.session),
            round: RoundConfig::from_settings(&config.challenge),
        }
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_round(mut self, round: RoundConfig) -> Self {
        self.round = round;
        self
    }

    pub fn with_retention_limit(mut self, limit: usize) -> Self {
        self.retention_limit = limit;
        self
    }
}

/// A job plus the runtime handles the orchestrator keeps beside it.
pub(crate) struct JobEntry {
    pub(crate) job: Job,
    pub(crate) cancel: CancellationToken,
    /// Present only while the job awaits judgment.
    pub(crate) judgment_tx: Option<oneshot::Sender<String>>,
}

impl JobEntry {
    pub(crate) fn new(job: Job) -> Self {
        Self {
            job,
            cancel: CancellationToken::new(),
            judgment_tx: None,
        }
    }
}

/// What the generation stage produced.
pub(crate) enum Generated {
    Round(RoundOutcome),
    Session(SessionOutcome),
}

/// Fixed progress milestones.
pub(crate) mod progress {
    pub const CLASSIFIED: u8 = 10;
    pub const ROUTED: u8 = 20;
    pub const GENERATED: u8 = 50;
    pub const JUDGED: u8 = 70;
    pub const ASSEMBLED: u8 = 85;
    pub const DEPLOYED: u8 = 95;
    pub const COMPLETED: u8 = 100;
}
