//! Job domain model.
//!
//! A job is one end-to-end pipeline execution. It is owned by the pipeline
//! orchestrator and mutated only through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};

use super::artifact::{Artifact, ArtifactRecord, Candidate};
use super::collaboration::SessionOutcome;
use super::implementation::RoundOutcome;
use super::task_descriptor::{PipelineVariant, TaskDescriptor};

/// Status of a job in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, processing not yet started
    Queued,
    /// A processing task is driving the job
    Processing,
    /// Candidates produced, waiting on an external judgment
    AwaitingJudgment,
    /// Finished with an artifact
    Completed,
    /// Stopped by an error
    Failed,
    /// Stopped by a caller
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::AwaitingJudgment => "awaiting_judgment",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "awaiting_judgment" => Some(Self::AwaitingJudgment),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<JobStatus> {
        match self {
            Self::Queued => vec![Self::Processing, Self::Failed, Self::Cancelled],
            Self::Processing => vec![
                Self::AwaitingJudgment,
                Self::Completed,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::AwaitingJudgment => vec![Self::Processing, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller options supplied with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub auto_judge: bool,
    pub auto_deploy: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            auto_judge: true,
            auto_deploy: false,
        }
    }
}

/// One entry in a job's step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub at: DateTime<Utc>,
    pub progress: u8,
    pub description: String,
}

/// What a completed job produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub variant: PipelineVariant,
    pub winner_worker_id: String,
    pub artifact: Artifact,
    pub artifact_record: Option<ArtifactRecord>,
    pub deployment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionOutcome>,
}

/// One pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub task: TaskDescriptor,
    pub options: JobOptions,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub status: JobStatus,
    pub variant: Option<PipelineVariant>,
    pub progress_percent: u8,
    pub step_log: Vec<StepEntry>,
    /// Populated while the job awaits judgment.
    pub candidates: Vec<Candidate>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    /// Every scored attempt of the job's challenge round, failures included.
    /// Cleared on completion, where `result.round` carries the decided round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<RoundOutcome>,
    pub error: Option<String>,
    pub cancel_reason: Option<String>,
}

impl Job {
    pub fn new(
        task: TaskDescriptor,
        options: JobOptions,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            options,
            metadata,
            status: JobStatus::Queued,
            variant: None,
            progress_percent: 0,
            step_log: Vec::new(),
            candidates: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            attempts: None,
            error: None,
            cancel_reason: None,
        }
    }

    /// Move to a new status, stamping start/completion times.
    pub fn transition_to(&mut self, new_status: JobStatus) -> PipelineResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(PipelineError::InvalidStateTransition {
                from: self.status,
                to: new_status,
            });
        }

        if new_status == JobStatus::Processing && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = new_status;
        Ok(())
    }

    /// Raise progress. Lower values are ignored so progress never decreases.
    pub fn advance_progress(&mut self, progress: u8) -> u8 {
        self.progress_percent = self.progress_percent.max(progress.min(100));
        self.progress_percent
    }

    /// Record a step and raise progress to at least `progress`.
    pub fn log_step(&mut self, progress: u8, description: impl Into<String>) -> &StepEntry {
        let progress = self.advance_progress(progress);
        self.step_log.push(StepEntry {
            at: Utc::now(),
            progress,
            description: description.into(),
        });
        &self.step_log[self.step_log.len() - 1]
    }

    /// Wall-clock processing time for completed jobs, measured from creation.
    pub fn processing_time_ms(&self) -> Option<i64> {
        match (self.status, self.completed_at) {
            (JobStatus::Completed, Some(done)) => Some((done - self.created_at).num_milliseconds()),
            _ => None,
        }
    }
}

/// Aggregate view over the job store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub awaiting_judgment: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean of `completed_at - created_at` over completed jobs.
    pub average_processing_ms: Option<f64>,
}

impl JobStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        let mut durations = Vec::new();

        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::AwaitingJudgment => stats.awaiting_judgment += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            if let Some(ms) = job.processing_time_ms() {
                durations.push(ms as f64);
            }
        }

        if !durations.is_empty() {
            stats.average_processing_ms =
                Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        stats
    }
}
