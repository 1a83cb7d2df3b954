//! Pipeline Orchestrator - owns the job lifecycle.
//!
//! The orchestrator accepts tasks, runs each job on its own task, and is the
//! only writer of job state:
//!
//! - **types**: configuration, the per-job runtime entry, progress milestones
//! - **processing**: the staged pipeline (route, generate, judge, assemble, deploy)
//!
//! Every job mutation goes through [`PipelineOrchestrator::update_entry`],
//! which refuses to touch terminal jobs and publishes the resulting events
//! while the job store lock is held. Once a job is cancelled nothing else is
//! emitted for it.

pub mod types;
mod processing;

pub use types::{OrchestratorConfig, CANCEL_REASON};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::adapters::workers::WorkerRoster;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{Job, JobOptions, JobStats, JobStatus, TaskDescriptor};
use crate::domain::ports::{ArtifactStore, Deployer, NullArtifactStore};
use crate::services::event_bus::{EventBus, EventPayload, UnifiedEvent};
use crate::services::event_store::EventQuery;

use types::JobEntry;

/// Drives jobs from submission to a terminal state.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    pub(super) config: Arc<OrchestratorConfig>,
    pub(super) roster: WorkerRoster,
    pub(super) artifact_store: Arc<dyn ArtifactStore>,
    pub(super) deployer: Option<Arc<dyn Deployer>>,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
}

// ============================================================================
// Constructor & Builder Pattern
// ============================================================================

impl PipelineOrchestrator {
    pub fn new(roster: WorkerRoster, config: OrchestratorConfig) -> Self {
        Self {
            config: Arc::new(config),
            roster,
            artifact_store: Arc::new(NullArtifactStore::new()),
            deployer: None,
            event_bus: Arc::new(EventBus::default()),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifact_store = store;
        self
    }

    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn roster(&self) -> &WorkerRoster {
        &self.roster
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Validate the task, queue a job and start processing it in the background.
    pub async fn submit(
        &self,
        task: TaskDescriptor,
        options: JobOptions,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> PipelineResult<Uuid> {
        task.validate()?;

        let job = Job::new(task, options, metadata);
        let job_id = job.id;
        let task_summary = job.task.summary();

        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(job_id, JobEntry::new(job));
            self.publish(job_id, EventPayload::JobCreated { task_summary: task_summary.clone() })
                .await;
        }

        tracing::info!(job_id = %job_id, task = %task_summary, "Job submitted");

        let this = self.clone();
        tokio::spawn(async move {
            this.process(job_id).await;
        });

        Ok(job_id)
    }

    /// Resume a job awaiting judgment with the chosen candidate.
    pub async fn judge(&self, job_id: Uuid, worker_id: &str) -> PipelineResult<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(PipelineError::JobNotFound(job_id))?;

        if entry.job.status != JobStatus::AwaitingJudgment {
            return Err(PipelineError::InvalidStateTransition {
                from: entry.job.status,
                to: JobStatus::Processing,
            });
        }
        if !entry.job.candidates.iter().any(|c| c.worker_id == worker_id) {
            return Err(PipelineError::UnknownCandidate(worker_id.to_string()));
        }

        // Already judged; the job is on its way back to processing.
        let tx = entry
            .judgment_tx
            .take()
            .ok_or(PipelineError::InvalidStateTransition {
                from: JobStatus::AwaitingJudgment,
                to: JobStatus::Processing,
            })?;
        tx.send(worker_id.to_string())
            .map_err(|_| PipelineError::Cancelled)?;

        tracing::info!(job_id = %job_id, worker_id, "Judgment received");
        Ok(())
    }

    /// Cancel a job that has not reached a terminal state.
    ///
    /// In-flight worker calls run to completion; their results are discarded.
    /// Returns false when the job is unknown or already terminal.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let cancelled = self
            .update_entry(job_id, |entry| {
                entry.job.transition_to(JobStatus::Cancelled)?;
                entry.job.cancel_reason = Some(CANCEL_REASON.to_string());
                entry.judgment_tx = None;
                entry.cancel.cancel();
                Ok((
                    (),
                    vec![EventPayload::JobCancelled {
                        reason: CANCEL_REASON.to_string(),
                    }],
                ))
            })
            .await
            .is_ok();

        if cancelled {
            tracing::info!(job_id = %job_id, "Job cancelled");
            self.cleanup().await;
        }
        cancelled
    }

    pub async fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&job_id).map(|e| e.job.clone())
    }

    /// Non-terminal jobs, oldest first.
    pub async fn list_active(&self) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut active: Vec<Job> = jobs
            .values()
            .filter(|e| e.job.status.is_active())
            .map(|e| e.job.clone())
            .collect();
        active.sort_by_key(|j| j.created_at);
        active
    }

    pub async fn get_stats(&self) -> JobStats {
        let jobs = self.jobs.read().await;
        JobStats::from_jobs(jobs.values().map(|e| &e.job))
    }

    /// Evict terminal jobs beyond the retention limit, oldest first.
    ///
    /// Returns the number of jobs evicted.
    pub async fn cleanup(&self) -> usize {
        let evicted: Vec<Uuid> = {
            let mut jobs = self.jobs.write().await;
            let mut terminal: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = jobs
                .values()
                .filter(|e| e.job.status.is_terminal())
                .map(|e| (e.job.id, e.job.completed_at.unwrap_or(e.job.created_at)))
                .collect();

            if terminal.len() <= self.config.retention_limit {
                return 0;
            }

            terminal.sort_by(|a, b| b.1.cmp(&a.1));
            let evicted: Vec<Uuid> = terminal
                .into_iter()
                .skip(self.config.retention_limit)
                .map(|(id, _)| id)
                .collect();
            for id in &evicted {
                jobs.remove(id);
            }
            evicted
        };

        if let Some(store) = self.event_bus.store() {
            for id in &evicted {
                if let Err(e) = store.forget_job(*id).await {
                    tracing::warn!(job_id = %id, error = %e, "Failed to drop events for evicted job");
                }
            }
        }

        tracing::debug!(evicted = evicted.len(), "Evicted terminal jobs");
        evicted.len()
    }

    /// Subscribe to every job, session and round event.
    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.event_bus.subscribe()
    }

    /// Stored events for one job, in publication order.
    ///
    /// Empty when the event bus has no store.
    pub async fn events_for(&self, job_id: Uuid) -> Vec<UnifiedEvent> {
        let Some(store) = self.event_bus.store() else {
            return Vec::new();
        };
        match store.query(EventQuery::new().job_id(job_id)).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to query job events");
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Apply a mutation to a live job and publish its events under the lock.
    ///
    /// Terminal jobs are never touched; the caller gets `Cancelled`.
    pub(super) async fn update_entry<R, F>(&self, job_id: Uuid, f: F) -> PipelineResult<R>
    where
        F: FnOnce(&mut JobEntry) -> PipelineResult<(R, Vec<EventPayload>)> + Send,
        R: Send,
    {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(PipelineError::JobNotFound(job_id))?;
        if entry.job.status.is_terminal() {
            return Err(PipelineError::Cancelled);
        }

        let (value, events) = f(entry)?;
        for payload in events {
            self.publish(job_id, payload).await;
        }
        Ok(value)
    }

    pub(super) async fn publish(&self, job_id: Uuid, payload: EventPayload) {
        self.event_bus
            .publish(UnifiedEvent::new(payload).for_job(Some(job_id)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::workers::ScriptedWorker;
    use crate::domain::models::{Persona, WorkerHandle};
    use std::time::Duration;

    fn orchestrator() -> PipelineOrchestrator {
        let roster = WorkerRoster::new().with_worker(Arc::new(
            ScriptedWorker::responding(WorkerHandle::new("a", "Ada", Persona::Fast), "ok")
                .with_delay(Duration::from_millis(200)),
        ));
        PipelineOrchestrator::new(roster, OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_task() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .submit(TaskDescriptor::new("", "component"), JobOptions::default(), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTask(_)));
        assert_eq!(orchestrator.get_stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let orchestrator = orchestrator();
        let job_id = orchestrator
            .submit(
                TaskDescriptor::new("create", "component"),
                JobOptions::default(),
                BTreeMap::new(),
            )
            .await
            .unwrap();

        assert!(orchestrator.cancel(job_id).await);
        assert!(!orchestrator.cancel(job_id).await);
        assert!(!orchestrator.cancel(Uuid::new_v4()).await);

        let job = orchestrator.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.cancel_reason.as_deref(), Some(CANCEL_REASON));
    }

    #[tokio::test]
    async fn test_judge_rejects_job_not_awaiting() {
        let orchestrator = orchestrator();
        assert!(matches!(
            orchestrator.judge(Uuid::new_v4(), "a").await,
            Err(PipelineError::JobNotFound(_))
        ));
    }
}
