//! Challenge round.
//!
//! A single-phase fan-out: every worker receives the same enriched prompt,
//! each response is scored, and every attempt is kept, failures included.
//! Picking the winner is a separate step so judgment can be deferred.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{
    ChallengeSettings, Implementation, ImplementationStatus, Proposal, RoundOutcome, RoundStatus,
    TaskDescriptor,
};
use crate::domain::ports::Worker;
use crate::services::event_bus::{EventBus, EventPayload, UnifiedEvent};
use crate::services::scoring::{self, ScoringRuleset};
use crate::services::worker_pool::{FanOutObserver, WorkerPool, WorkerRequest};

/// Round tuning, injected at construction.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    pub worker_timeout: Duration,
    pub ruleset: ScoringRuleset,
    /// Visual identity tokens every implementation must apply.
    pub identity_tokens: Vec<String>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self::from_settings(&ChallengeSettings::default())
    }
}

impl RoundConfig {
    pub fn from_settings(settings: &ChallengeSettings) -> Self {
        Self {
            worker_timeout: Duration::from_secs(settings.worker_timeout_secs),
            ruleset: ScoringRuleset::default()
                .with_required_signals(settings.required_signals.clone()),
            identity_tokens: settings.identity_tokens.clone(),
        }
    }

    pub fn with_ruleset(mut self, ruleset: ScoringRuleset) -> Self {
        self.ruleset = ruleset;
        self
    }
}

pub struct ChallengeRound {
    id: Uuid,
    task: TaskDescriptor,
    workers: Vec<Arc<dyn Worker>>,
    config: RoundConfig,
    bus: Option<Arc<EventBus>>,
    job_id: Option<Uuid>,
}

impl ChallengeRound {
    pub fn new(task: TaskDescriptor, workers: Vec<Arc<dyn Worker>>, config: RoundConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            workers,
            config,
            bus: None,
            job_id: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn for_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Query every worker at once and score the results.
    ///
    /// Returns the round in `Judging` with one implementation per worker in
    /// roster order.
    pub async fn run(&self, cancel: &CancellationToken) -> PipelineResult<RoundOutcome> {
        if self.workers.is_empty() {
            return Err(PipelineError::NoWorkersAvailable);
        }

        let started_at = Utc::now();
        let prompt = self.enriched_prompt();
        let requests: Vec<WorkerRequest> = self
            .workers
            .iter()
            .map(|w| WorkerRequest::new(w.clone(), prompt.clone()))
            .collect();

        tracing::info!(
            round_id = %self.id,
            job_id = ?self.job_id,
            workers = requests.len(),
            "Starting challenge round"
        );

        let pool = WorkerPool::new(requests.len(), self.config.worker_timeout);
        let observer = ImplementationObserver {
            bus: self.bus.clone(),
            job_id: self.job_id,
            round_id: self.id,
            ruleset: self.config.ruleset.clone(),
            cancel: cancel.clone(),
        };
        let fan_out = pool.fan_out(requests, cancel, &observer).await;
        if fan_out.cancelled || cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let implementations: Vec<Implementation> = fan_out
            .proposals
            .iter()
            .map(|p| score_proposal(p, &self.config.ruleset))
            .collect();

        let outcome = RoundOutcome {
            round_id: self.id,
            status: RoundStatus::Judging,
            implementations,
            started_at,
            completed_at: Utc::now(),
        };

        tracing::info!(
            round_id = %self.id,
            implementations = outcome.implementations.len(),
            failed = outcome.failed_count(),
            "Challenge round judging"
        );
        observer
            .publish(EventPayload::RoundJudging {
                implementation_count: outcome.implementations.len(),
                failed_count: outcome.failed_count(),
            })
            .await;

        Ok(outcome)
    }

    /// Prompt with the task plus the identity and integration constraints.
    pub fn enriched_prompt(&self) -> String {
        let mut prompt = format!(
            "Task: {}\nProduce a complete {} implementation and return only the code.\n",
            self.task.summary(),
            self.task.artifact_kind.trim()
        );
        if !self.config.identity_tokens.is_empty() {
            prompt.push_str(&format!(
                "Apply these identity tokens: {}.\n",
                self.config.identity_tokens.join(", ")
            ));
        }
        if !self.config.ruleset.required_signals.is_empty() {
            prompt.push_str(&format!(
                "Reference these integration keywords: {}.\n",
                self.config.ruleset.required_signals.join(", ")
            ));
        }
        prompt.push_str("Comment the key decisions.");
        prompt
    }

    /// Pick the highest-scoring successful implementation and mark the round decided.
    pub fn select_winner(outcome: &mut RoundOutcome) -> Option<Implementation> {
        let winner = scoring::select_winner(&outcome.implementations).cloned();
        if winner.is_some() {
            outcome.status = RoundStatus::Decided;
        }
        winner
    }

    /// Mark the round decided in favor of a specific worker.
    pub fn decide_for(outcome: &mut RoundOutcome, worker_id: &str) -> Option<Implementation> {
        let chosen = outcome
            .successful()
            .find(|i| i.worker_id == worker_id)
            .cloned();
        if chosen.is_some() {
            outcome.status = RoundStatus::Decided;
        }
        chosen
    }
}

/// Turn a proposal into a scored implementation row.
pub fn score_proposal(proposal: &Proposal, ruleset: &ScoringRuleset) -> Implementation {
    if !proposal.is_success() {
        return Implementation::failed_from(proposal);
    }

    let (analysis, total_score) = ruleset.evaluate(&proposal.text, proposal.latency_ms);
    Implementation {
        worker_id: proposal.worker_id.clone(),
        worker_name: proposal.worker_name.clone(),
        code: proposal.text.clone(),
        status: ImplementationStatus::Succeeded,
        syntax_valid: analysis.syntax_valid,
        has_comments: analysis.has_comments,
        uses_required_signals: analysis.uses_required_signals,
        generation_time_ms: proposal.latency_ms,
        timed_out: false,
        total_score,
        message: None,
    }
}

struct ImplementationObserver {
    bus: Option<Arc<EventBus>>,
    job_id: Option<Uuid>,
    round_id: Uuid,
    ruleset: ScoringRuleset,
    cancel: CancellationToken,
}

impl ImplementationObserver {
    async fn publish(&self, payload: EventPayload) {
        let Some(bus) = &self.bus else { return };
        if self.cancel.is_cancelled() {
            return;
        }
        bus.publish(
            UnifiedEvent::new(payload)
                .for_job(self.job_id)
                .in_session(self.round_id),
        )
        .await;
    }
}

#[async_trait]
impl FanOutObserver for ImplementationObserver {
    async fn on_result(&self, _index: usize, proposal: &Proposal) {
        let implementation = score_proposal(proposal, &self.ruleset);
        self.publish(EventPayload::RoundImplementation {
            worker_id: implementation.worker_id,
            worker_name: implementation.worker_name,
            success: implementation.status == ImplementationStatus::Succeeded,
            total_score: implementation.total_score,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::workers::ScriptedWorker;
    use crate::domain::models::{Persona, WorkerHandle};

    fn handle(id: &str) -> WorkerHandle {
        WorkerHandle::new(id, id, Persona::Generalist)
    }

    #[test]
    fn test_enriched_prompt_includes_constraints() {
        let settings = ChallengeSettings {
            worker_timeout_secs: 5,
            required_signals: vec!["onClick".to_string()],
            identity_tokens: vec!["--brand-blue".to_string()],
        };
        let round = ChallengeRound::new(
            TaskDescriptor::new("create", "component").with_attribute("type", "button"),
            Vec::new(),
            RoundConfig::from_settings(&settings),
        );
        let prompt = round.enriched_prompt();
        assert!(prompt.starts_with("Task: create component (type=button)"));
        assert!(prompt.contains("--brand-blue"));
        assert!(prompt.contains("onClick"));
    }

    #[tokio::test]
    async fn test_round_records_failures_and_selects_winner() {
        let workers: Vec<Arc<dyn Worker>> = vec![
            Arc::new(ScriptedWorker::responding(handle("a"), "minimal flat design")),
            Arc::new(ScriptedWorker::failing(handle("b"), "rate limited")),
            Arc::new(ScriptedWorker::responding(
                handle("c"),
                "// bold animated button\nconst Button = () => { return animate(); };",
            )),
        ];

        let round = ChallengeRound::new(
            TaskDescriptor::new("create", "component"),
            workers,
            RoundConfig::default(),
        );
        let mut outcome = round.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.status, RoundStatus::Judging);
        assert_eq!(outcome.implementations.len(), 3);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.implementations[1].total_score, 0);
        assert_eq!(
            outcome.implementations[1].message.as_deref(),
            Some("Worker b failed: Transport error: rate limited")
        );

        let winner = ChallengeRound::select_winner(&mut outcome).unwrap();
        assert_eq!(winner.worker_id, "c");
        assert_eq!(outcome.status, RoundStatus::Decided);
    }

    #[tokio::test]
    async fn test_empty_roster_is_rejected() {
        let round = ChallengeRound::new(
            TaskDescriptor::new("create", "component"),
            Vec::new(),
            RoundConfig::default(),
        );
        assert!(matches!(
            round.run(&CancellationToken::new()).await,
            Err(PipelineError::NoWorkersAvailable)
        ));
    }
}
