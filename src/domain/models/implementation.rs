//! Challenge round records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::proposal::Proposal;
use crate::domain::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationStatus {
    Succeeded,
    Failed,
}

/// One worker's scored attempt in a challenge round.
///
/// Failed attempts are kept with a zero score so the round preserves its
/// full attempt history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub worker_id: String,
    pub worker_name: String,
    pub code: String,
    pub status: ImplementationStatus,
    pub syntax_valid: bool,
    pub has_comments: bool,
    pub uses_required_signals: bool,
    pub generation_time_ms: u64,
    pub timed_out: bool,
    pub total_score: u32,
    pub message: Option<String>,
}

impl Implementation {
    /// Failed row built from an unsuccessful proposal.
    pub fn failed_from(proposal: &Proposal) -> Self {
        Self {
            worker_id: proposal.worker_id.clone(),
            worker_name: proposal.worker_name.clone(),
            code: String::new(),
            status: ImplementationStatus::Failed,
            syntax_valid: false,
            has_comments: false,
            uses_required_signals: false,
            generation_time_ms: proposal.latency_ms,
            timed_out: proposal.timed_out,
            total_score: 0,
            message: Some(
                PipelineError::WorkerFailure {
                    worker_id: proposal.worker_id.clone(),
                    reason: proposal
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "generation failed".to_string()),
                }
                .to_string(),
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ImplementationStatus::Succeeded
    }
}

/// Lifecycle of a challenge round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Judging,
    Decided,
}

/// Everything a challenge round produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_id: Uuid,
    pub status: RoundStatus,
    pub implementations: Vec<Implementation>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RoundOutcome {
    pub fn successful(&self) -> impl Iterator<Item = &Implementation> {
        self.implementations.iter().filter(|i| i.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.implementations.iter().filter(|i| !i.is_success()).count()
    }
}
