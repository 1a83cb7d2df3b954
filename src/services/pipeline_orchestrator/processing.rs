//! Staged job processing: route, generate, judge, assemble, deploy.

use std::collections::BTreeMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{
    Artifact, Candidate, Job, JobOptions, JobResult, JobStatus, PipelineVariant, TaskDescriptor,
};
use crate::services::challenge_round::ChallengeRound;
use crate::services::collaboration_session::CollaborationSession;
use crate::services::event_bus::{EventPayload, JobResultPayload};

use super::types::{progress, Generated};
use super::PipelineOrchestrator;

impl PipelineOrchestrator {
    /// Run a job to a terminal state. Never leaves the job in `processing`.
    #[instrument(skip(self))]
    pub(super) async fn process(&self, job_id: Uuid) {
        let Some((task, options, cancel)) = self.snapshot(job_id).await else {
            tracing::warn!("Job vanished before processing started");
            return;
        };

        match self.run_pipeline(job_id, &task, options, &cancel).await {
            Ok(()) => {}
            Err(e) if is_abandoned(&e) => {
                tracing::debug!(reason = %e, "Processing stopped, job no longer live");
            }
            Err(e) => self.fail_job(job_id, &e).await,
        }
    }

    async fn snapshot(
        &self,
        job_id: Uuid,
    ) -> Option<(TaskDescriptor, JobOptions, CancellationToken)> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id)
            .map(|e| (e.job.task.clone(), e.job.options, e.cancel.clone()))
    }

    async fn run_pipeline(
        &self,
        job_id: Uuid,
        task: &TaskDescriptor,
        options: JobOptions,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        self.update_entry(job_id, |entry| {
            entry.job.transition_to(JobStatus::Processing)?;
            Ok(((), vec![EventPayload::JobStarted]))
        })
        .await?;
        tracing::info!("Job started");

        // Route
        self.step(job_id, progress::CLASSIFIED, "Classifying task").await?;
        let variant = PipelineVariant::classify(&task.artifact_kind, &self.config.collaborative_kinds);
        self.update_entry(job_id, |entry| {
            entry.job.variant = Some(variant);
            Ok(((), Vec::new()))
        })
        .await?;
        self.step(job_id, progress::ROUTED, format!("Routed to {variant}"))
            .await?;

        // Generate
        ensure_active(cancel)?;
        let mut generated = self.generate(job_id, task, variant, cancel).await?;
        if let Generated::Round(outcome) = &generated {
            let attempts = outcome.clone();
            self.update_entry(job_id, |entry| {
                entry.job.attempts = Some(attempts);
                Ok(((), Vec::new()))
            })
            .await?;
        }
        let candidates = candidates_for(&generated);
        if candidates.is_empty() {
            return Err(PipelineError::NoWorkersAvailable);
        }
        self.step(
            job_id,
            progress::GENERATED,
            format!("Generated {} candidates", candidates.len()),
        )
        .await?;

        // Judge
        ensure_active(cancel)?;
        let winner_id = if options.auto_judge {
            auto_winner(&mut generated)?
        } else {
            let chosen = self.await_judgment(job_id, candidates.clone(), cancel).await?;
            if let Generated::Round(outcome) = &mut generated {
                ChallengeRound::decide_for(outcome, &chosen)
                    .ok_or_else(|| PipelineError::UnknownCandidate(chosen.clone()))?;
            }
            chosen
        };
        let winner = candidates
            .iter()
            .find(|c| c.worker_id == winner_id)
            .ok_or_else(|| PipelineError::UnknownCandidate(winner_id.clone()))?;
        self.step(
            job_id,
            progress::JUDGED,
            format!("Selected {} ({})", winner.worker_name, winner.worker_id),
        )
        .await?;

        // Assemble and persist
        ensure_active(cancel)?;
        let metadata = self.job_metadata(job_id).await;
        let artifact = assemble_artifact(task, variant, winner, &generated, metadata);
        let artifact_record = match self.artifact_store.save_artifact(&artifact).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Artifact persistence failed, continuing");
                None
            }
        };
        self.step(job_id, progress::ASSEMBLED, "Artifact assembled").await?;

        // Deploy
        ensure_active(cancel)?;
        let deployment_url = if options.auto_deploy {
            let deployer = self.deployer.as_ref().ok_or_else(|| {
                PipelineError::DeploymentFailure("no deployer configured".to_string())
            })?;
            let url = deployer.deploy(&artifact, task).await.map_err(|e| match e {
                PipelineError::DeploymentFailure(_) => e,
                other => PipelineError::DeploymentFailure(other.to_string()),
            })?;
            self.step(job_id, progress::DEPLOYED, format!("Deployed to {url}"))
                .await?;
            Some(url)
        } else {
            self.step(job_id, progress::DEPLOYED, "Deployment skipped")
                .await?;
            None
        };

        let (round, session) = match generated {
            Generated::Round(outcome) => (Some(outcome), None),
            Generated::Session(outcome) => (None, Some(outcome)),
        };
        let result = JobResult {
            variant,
            winner_worker_id: winner_id,
            artifact,
            artifact_record,
            deployment_url,
            round,
            session,
        };

        self.complete_job(job_id, result).await?;
        self.cleanup().await;
        Ok(())
    }

    async fn generate(
        &self,
        job_id: Uuid,
        task: &TaskDescriptor,
        variant: PipelineVariant,
        cancel: &CancellationToken,
    ) -> PipelineResult<Generated> {
        match variant {
            PipelineVariant::ChallengeRound => {
                let workers = self.roster.for_domain(&task.artifact_kind);
                let outcome = ChallengeRound::new(task.clone(), workers, self.config.round.clone())
                    .with_event_bus(self.event_bus.clone())
                    .for_job(job_id)
                    .run(cancel)
                    .await?;
                Ok(Generated::Round(outcome))
            }
            PipelineVariant::CollaborationSession => {
                let workers = self.roster.available();
                if workers.is_empty() {
                    return Err(PipelineError::NoWorkersAvailable);
                }
                let outcome =
                    CollaborationSession::new(task.clone(), workers, self.config.session.clone())
                        .with_event_bus(self.event_bus.clone())
                        .for_job(job_id)
                        .run(cancel)
                        .await?;
                Ok(Generated::Session(outcome))
            }
        }
    }

    /// Suspend until `judge` or `cancel` is called. Holds no lock while waiting.
    async fn await_judgment(
        &self,
        job_id: Uuid,
        candidates: Vec<Candidate>,
        cancel: &CancellationToken,
    ) -> PipelineResult<String> {
        let (tx, rx) = oneshot::channel();
        self.update_entry(job_id, |entry| {
            entry.job.transition_to(JobStatus::AwaitingJudgment)?;
            entry.job.candidates = candidates.clone();
            entry.judgment_tx = Some(tx);
            Ok(((), vec![EventPayload::JobAwaitingJudgment { candidates }]))
        })
        .await?;
        tracing::info!("Awaiting judgment");

        let chosen = tokio::select! {
            result = rx => result.map_err(|_| PipelineError::Cancelled)?,
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
        };

        self.update_entry(job_id, |entry| {
            entry.job.transition_to(JobStatus::Processing)?;
            entry.job.candidates.clear();
            Ok(((), Vec::new()))
        })
        .await?;
        Ok(chosen)
    }

    async fn step(
        &self,
        job_id: Uuid,
        progress: u8,
        description: impl Into<String> + Send,
    ) -> PipelineResult<()> {
        let description = description.into();
        tracing::debug!(progress, step = %description, "Job step");
        self.update_entry(job_id, |entry| {
            let progress = entry.job.log_step(progress, description.clone()).progress;
            Ok(((), vec![EventPayload::JobStep { description, progress }]))
        })
        .await
    }

    async fn job_metadata(&self, job_id: Uuid) -> BTreeMap<String, serde_json::Value> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|e| e.job.metadata.clone())
            .unwrap_or_default()
    }

    async fn complete_job(&self, job_id: Uuid, result: JobResult) -> PipelineResult<()> {
        let payload = JobResultPayload::from(&result);
        self.update_entry(job_id, |entry| {
            entry.job.log_step(progress::COMPLETED, "Completed");
            entry.job.result = Some(result);
            entry.job.attempts = None;
            entry.job.transition_to(JobStatus::Completed)?;
            Ok((
                (),
                vec![
                    EventPayload::JobStep {
                        description: "Completed".to_string(),
                        progress: progress::COMPLETED,
                    },
                    EventPayload::JobCompleted { result: payload },
                ],
            ))
        })
        .await?;

        let processing_ms = self
            .get_job(job_id)
            .await
            .as_ref()
            .and_then(Job::processing_time_ms);
        tracing::info!(processing_ms, "Job completed");
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &PipelineError) {
        let message = error.to_string();
        tracing::warn!(error = %message, "Job failed");

        let failed = self
            .update_entry(job_id, |entry| {
                entry.job.error = Some(message.clone());
                entry.judgment_tx = None;
                entry.job.transition_to(JobStatus::Failed)?;
                Ok(((), vec![EventPayload::JobFailed { error: message }]))
            })
            .await;

        if failed.is_ok() {
            self.cleanup().await;
        }
    }
}

/// Errors meaning the job was cancelled or evicted underneath the pipeline.
fn is_abandoned(error: &PipelineError) -> bool {
    matches!(error, PipelineError::Cancelled | PipelineError::JobNotFound(_))
}

fn ensure_active(cancel: &CancellationToken) -> PipelineResult<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn candidates_for(generated: &Generated) -> Vec<Candidate> {
    match generated {
        Generated::Round(outcome) => outcome.successful().map(Candidate::from).collect(),
        Generated::Session(outcome) => outcome
            .successful_proposals()
            .map(|p| {
                let votes = outcome
                    .tally
                    .votes_by_worker
                    .get(&p.worker_name)
                    .copied()
                    .unwrap_or(0);
                Candidate::from_proposal(p, votes)
            })
            .collect(),
    }
}

fn auto_winner(generated: &mut Generated) -> PipelineResult<String> {
    match generated {
        Generated::Round(outcome) => ChallengeRound::select_winner(outcome)
            .map(|i| i.worker_id)
            .ok_or(PipelineError::NoWorkersAvailable),
        Generated::Session(outcome) => Ok(outcome.tally.winner.worker_id.clone()),
    }
}

fn assemble_artifact(
    task: &TaskDescriptor,
    variant: PipelineVariant,
    winner: &Candidate,
    generated: &Generated,
    mut metadata: BTreeMap<String, serde_json::Value>,
) -> Artifact {
    metadata.insert("variant".to_string(), variant.as_str().into());
    metadata.insert("task".to_string(), task.summary().into());
    metadata.insert("worker_name".to_string(), winner.worker_name.clone().into());
    metadata.insert("score".to_string(), winner.score.into());

    match generated {
        Generated::Round(outcome) => {
            metadata.insert("round_id".to_string(), outcome.round_id.to_string().into());
        }
        Generated::Session(outcome) => {
            metadata.insert("session_id".to_string(), outcome.session_id.to_string().into());
            metadata.insert(
                "approach".to_string(),
                outcome.consensus.approach.clone().into(),
            );
            metadata.insert(
                "consensus_confidence".to_string(),
                outcome.consensus.confidence.into(),
            );
        }
    }

    Artifact {
        kind: task.artifact_kind.trim().to_string(),
        source_worker: winner.worker_id.clone(),
        payload: winner.payload.clone(),
        metadata,
    }
}
