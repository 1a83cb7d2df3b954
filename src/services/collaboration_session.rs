//! Collaboration session.
//!
//! Runs one task through four ordered phases: proposal gathering, an
//! optional debate, consensus building and a self-vote. The whole run is
//! bounded by `max_duration`; exceeding it fails the session with
//! [`PipelineError::JudgmentTimeout`].

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{
    Consensus, Debate, Proposal, SessionOutcome, SessionPhase, SessionSettings, TaskDescriptor,
    Theme, ThemeSummary, VoteTally, VoteWinner, WorkerHandle,
};
use crate::domain::ports::Worker;
use crate::services::event_bus::{EventBus, EventPayload, UnifiedEvent};
use crate::services::scoring::{
    extract_themes, KeywordTable, FALLBACK_CONFIDENCE, FALLBACK_THEME,
};
use crate::services::worker_pool::{FanOutObserver, WorkerPool, WorkerRequest};

/// Number of runner-up themes kept as alternatives.
const ALTERNATIVE_THEMES: usize = 2;

/// Session tuning, injected at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_concurrent_workers: usize,
    pub worker_timeout: Duration,
    pub enable_debate: bool,
    pub max_debates: usize,
    pub max_duration: Duration,
    pub keyword_table: KeywordTable,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            max_concurrent_workers: settings.max_concurrent_workers,
            worker_timeout: Duration::from_secs(settings.worker_timeout_secs),
            enable_debate: settings.enable_debate,
            max_debates: settings.max_debates,
            max_duration: Duration::from_secs(settings.max_duration_secs),
            keyword_table: KeywordTable::default(),
        }
    }

    pub fn with_keyword_table(mut self, table: KeywordTable) -> Self {
        self.keyword_table = table;
        self
    }
}

/// One collaboration session over a fixed set of workers.
pub struct CollaborationSession {
    id: Uuid,
    task: TaskDescriptor,
    workers: Vec<Arc<dyn Worker>>,
    config: SessionConfig,
    bus: Option<Arc<EventBus>>,
    job_id: Option<Uuid>,
    phase: SessionPhase,
}

impl CollaborationSession {
    pub fn new(task: TaskDescriptor, workers: Vec<Arc<dyn Worker>>, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            workers,
            config,
            bus: None,
            job_id: None,
            phase: SessionPhase::Created,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Tag every emitted event with the owning job.
    pub fn for_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Run every phase to completion within the configured time budget.
    pub async fn run(mut self, cancel: &CancellationToken) -> PipelineResult<SessionOutcome> {
        let budget = self.config.max_duration;
        let started_at = Utc::now();

        tracing::info!(
            session_id = %self.id,
            job_id = ?self.job_id,
            workers = self.workers.len(),
            "Starting collaboration session"
        );

        let result = match tokio::time::timeout(budget, self.run_phases(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::JudgmentTimeout {
                timeout_secs: budget.as_secs(),
            }),
        };

        match result {
            Ok(parts) => {
                let outcome = SessionOutcome {
                    session_id: self.id,
                    phase: self.phase,
                    proposals: parts.proposals,
                    debates: parts.debates,
                    themes: parts.themes,
                    consensus: parts.consensus,
                    tally: parts.tally,
                    started_at,
                    completed_at: Utc::now(),
                };
                tracing::info!(
                    session_id = %self.id,
                    duration_ms = outcome.duration_ms(),
                    winner = %outcome.tally.winner.worker_id,
                    "Collaboration session completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Collaboration session failed");
                self.enter_phase(SessionPhase::Failed, cancel).await;
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self, cancel: &CancellationToken) -> PipelineResult<SessionParts> {
        // Phase 1: gather proposals
        self.ensure_active(cancel)?;
        self.enter_phase(SessionPhase::GatheringProposals, cancel).await;
        let proposals = self.gather_proposals(cancel).await?;
        let successful: Vec<&Proposal> = proposals.iter().filter(|p| p.is_success()).collect();
        if successful.is_empty() {
            return Err(PipelineError::NoWorkersAvailable);
        }

        // Phase 2: debate
        self.ensure_active(cancel)?;
        let mut debates = Vec::new();
        if self.config.enable_debate && successful.len() >= 2 {
            self.enter_phase(SessionPhase::Debating, cancel).await;
            debates = select_debates(&successful, self.config.max_debates);
            for debate in &debates {
                self.emit(EventPayload::SessionDebate { debate: debate.clone() }, cancel)
                    .await;
            }
        } else {
            tracing::debug!(
                session_id = %self.id,
                successful = successful.len(),
                "Skipping debate phase"
            );
        }

        // Phase 3: consensus
        self.ensure_active(cancel)?;
        self.enter_phase(SessionPhase::ConsensusBuilding, cancel).await;
        let owned: Vec<Proposal> = successful.iter().map(|p| (*p).clone()).collect();
        let themes = extract_themes(&owned, &self.config.keyword_table);
        let consensus = build_consensus(&themes);
        self.emit(
            EventPayload::SessionConsensus {
                consensus: consensus.clone(),
            },
            cancel,
        )
        .await;

        // Phase 4: vote
        self.ensure_active(cancel)?;
        self.enter_phase(SessionPhase::Voting, cancel).await;
        let tally = tally_self_votes(&successful).ok_or(PipelineError::NoWorkersAvailable)?;
        self.emit(EventPayload::SessionVote { tally: tally.clone() }, cancel)
            .await;

        self.enter_phase(SessionPhase::Completed, cancel).await;

        Ok(SessionParts {
            themes: themes.iter().map(ThemeSummary::from).collect(),
            proposals,
            debates,
            consensus,
            tally,
        })
    }

    async fn gather_proposals(&self, cancel: &CancellationToken) -> PipelineResult<Vec<Proposal>> {
        let requests: Vec<WorkerRequest> = self
            .workers
            .iter()
            .map(|w| WorkerRequest::new(w.clone(), proposal_prompt(&self.task, w.handle())))
            .collect();

        let pool = WorkerPool::new(self.config.max_concurrent_workers, self.config.worker_timeout);
        let observer = ProposalObserver {
            bus: self.bus.clone(),
            job_id: self.job_id,
            session_id: self.id,
            cancel: cancel.clone(),
        };

        let fan_out = pool.fan_out(requests, cancel, &observer).await;
        if fan_out.cancelled || cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        tracing::info!(
            session_id = %self.id,
            proposals = fan_out.proposals.len(),
            successful = fan_out.success_count(),
            "Proposals gathered"
        );
        Ok(fan_out.proposals)
    }

    fn ensure_active(&self, cancel: &CancellationToken) -> PipelineResult<()> {
        if cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn enter_phase(&mut self, next: SessionPhase, cancel: &CancellationToken) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                session_id = %self.id,
                from = %self.phase,
                to = %next,
                "Unexpected session phase transition"
            );
        }
        let from = self.phase;
        self.phase = next;
        tracing::debug!(session_id = %self.id, from = %from, to = %next, "Session phase changed");
        self.emit(EventPayload::SessionPhaseChanged { from, to: next }, cancel)
            .await;
    }

    async fn emit(&self, payload: EventPayload, cancel: &CancellationToken) {
        publish_session_event(self.bus.as_deref(), self.job_id, self.id, cancel, payload).await;
    }
}

struct SessionParts {
    proposals: Vec<Proposal>,
    debates: Vec<Debate>,
    themes: Vec<ThemeSummary>,
    consensus: Consensus,
    tally: VoteTally,
}

/// Events for a cancelled job are dropped.
async fn publish_session_event(
    bus: Option<&EventBus>,
    job_id: Option<Uuid>,
    session_id: Uuid,
    cancel: &CancellationToken,
    payload: EventPayload,
) {
    let Some(bus) = bus else { return };
    if cancel.is_cancelled() {
        return;
    }
    bus.publish(UnifiedEvent::new(payload).for_job(job_id).in_session(session_id))
        .await;
}

struct ProposalObserver {
    bus: Option<Arc<EventBus>>,
    job_id: Option<Uuid>,
    session_id: Uuid,
    cancel: CancellationToken,
}

#[async_trait]
impl FanOutObserver for ProposalObserver {
    async fn on_result(&self, _index: usize, proposal: &Proposal) {
        publish_session_event(
            self.bus.as_deref(),
            self.job_id,
            self.session_id,
            &self.cancel,
            EventPayload::SessionProposal {
                worker_id: proposal.worker_id.clone(),
                worker_name: proposal.worker_name.clone(),
                success: proposal.is_success(),
                timed_out: proposal.timed_out,
                latency_ms: proposal.latency_ms,
            },
        )
        .await;
    }
}

/// Prompt sent to each worker in the proposal phase.
pub fn proposal_prompt(task: &TaskDescriptor, worker: &WorkerHandle) -> String {
    format!(
        "You are {name}, a {persona} contributor. Your stance: {stance}.\n\
         Task: {summary}\n\
         Propose an approach in a few sentences. Name the core idea and the main trade-off, \
         then say what you would build first.",
        name = worker.name,
        persona = worker.persona,
        stance = worker.persona.stance(),
        summary = task.summary(),
    )
}

/// Pick up to `max` debate pairs.
///
/// Pairs whose personas contrast come first, in index order. Remaining
/// slots are filled with adjacent pairs not already chosen.
pub fn select_debates(proposals: &[&Proposal], max: usize) -> Vec<Debate> {
    let mut pairs: Vec<(usize, usize, bool)> = Vec::new();

    'outer: for i in 0..proposals.len() {
        for j in (i + 1)..proposals.len() {
            if pairs.len() >= max {
                break 'outer;
            }
            if proposals[i].persona.contrasts_with(proposals[j].persona) {
                pairs.push((i, j, true));
            }
        }
    }

    for i in 0..proposals.len().saturating_sub(1) {
        if pairs.len() >= max {
            break;
        }
        if !pairs.iter().any(|&(a, b, _)| (a, b) == (i, i + 1)) {
            pairs.push((i, i + 1, false));
        }
    }

    pairs
        .into_iter()
        .map(|(i, j, contrasting)| {
            let (a, b) = (proposals[i], proposals[j]);
            Debate {
                first_worker_id: a.worker_id.clone(),
                second_worker_id: b.worker_id.clone(),
                talking_point: talking_point(a, b, contrasting),
                contrasting,
            }
        })
        .collect()
}

fn talking_point(a: &Proposal, b: &Proposal, contrasting: bool) -> String {
    if contrasting {
        format!(
            "{} ({}) wants to {}, while {} ({}) would rather {}.",
            a.worker_name,
            a.persona,
            a.persona.stance(),
            b.worker_name,
            b.persona,
            b.persona.stance()
        )
    } else {
        format!(
            "{} proposes \"{}\" where {} proposes \"{}\".",
            a.worker_name,
            a.excerpt(),
            b.worker_name,
            b.excerpt()
        )
    }
}

/// Top theme becomes the approach; the next ones become alternatives.
fn build_consensus(themes: &[Theme]) -> Consensus {
    match themes.split_first() {
        Some((top, rest)) => Consensus {
            approach: top.label.clone(),
            supporting_worker_ids: top.supporting_worker_ids.clone(),
            confidence: top.confidence,
            alternative_approaches: rest
                .iter()
                .take(ALTERNATIVE_THEMES)
                .map(|t| t.label.clone())
                .collect(),
        },
        None => Consensus {
            approach: FALLBACK_THEME.to_string(),
            supporting_worker_ids: Vec::new(),
            confidence: FALLBACK_CONFIDENCE,
            alternative_approaches: Vec::new(),
        },
    }
}

/// Each successful proposal votes once for its own worker, keyed by display
/// name. The winner is the highest count; ties go to the name seen first.
pub fn tally_self_votes(successful: &[&Proposal]) -> Option<VoteTally> {
    let mut votes_by_worker: BTreeMap<String, u32> = BTreeMap::new();
    let mut first_seen: Vec<(&str, &str)> = Vec::new();

    for proposal in successful {
        *votes_by_worker
            .entry(proposal.worker_name.clone())
            .or_insert(0) += 1;
        if !first_seen.iter().any(|(name, _)| *name == proposal.worker_name) {
            first_seen.push((&proposal.worker_name, &proposal.worker_id));
        }
    }

    let total = successful.len() as f64;
    let mut winner: Option<(&str, &str, u32)> = None;
    for &(name, worker_id) in &first_seen {
        let count = votes_by_worker.get(name).copied().unwrap_or(0);
        if winner.map_or(true, |(_, _, best)| count > best) {
            winner = Some((name, worker_id, count));
        }
    }

    let (name, worker_id, vote_count) = winner?;
    let percentage = (f64::from(vote_count) / total * 1000.0).round() / 10.0;

    Some(VoteTally {
        winner: VoteWinner {
            worker_id: worker_id.to_string(),
            worker_name: name.to_string(),
            vote_count,
            percentage,
        },
        votes_by_worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::workers::ScriptedWorker;
    use crate::domain::models::Persona;

    fn proposal(id: &str, name: &str, persona: Persona) -> Proposal {
        Proposal::succeeded(&WorkerHandle::new(id, name, persona), format!("{name} idea."), 5)
    }

    #[test]
    fn test_debates_prefer_contrasting_personas() {
        let p = [
            proposal("a", "A", Persona::Thorough),
            proposal("b", "B", Persona::Bold),
            proposal("c", "C", Persona::Fast),
            proposal("d", "D", Persona::Minimalist),
        ];
        let refs: Vec<&Proposal> = p.iter().collect();
        let debates = select_debates(&refs, 3);

        assert_eq!(debates.len(), 3);
        assert_eq!((debates[0].first_worker_id.as_str(), debates[0].second_worker_id.as_str()), ("a", "c"));
        assert!(debates[0].contrasting);
        assert_eq!((debates[1].first_worker_id.as_str(), debates[1].second_worker_id.as_str()), ("b", "d"));
        assert!(debates[1].contrasting);
        // Filled with the first adjacent pair.
        assert_eq!((debates[2].first_worker_id.as_str(), debates[2].second_worker_id.as_str()), ("a", "b"));
        assert!(!debates[2].contrasting);
    }

    #[test]
    fn test_debates_capped_by_proposal_count() {
        let p = [
            proposal("a", "A", Persona::Generalist),
            proposal("b", "B", Persona::Generalist),
        ];
        let refs: Vec<&Proposal> = p.iter().collect();
        assert_eq!(select_debates(&refs, 3).len(), 1);
        assert!(select_debates(&refs[..1], 3).is_empty());
    }

    #[test]
    fn test_self_vote_tally() {
        let p = [
            proposal("a", "Ada", Persona::Fast),
            proposal("b", "Bo", Persona::Bold),
            proposal("c", "Bo", Persona::Bold),
        ];
        let refs: Vec<&Proposal> = p.iter().collect();
        let tally = tally_self_votes(&refs).unwrap();

        assert_eq!(tally.total_votes(), 3);
        assert_eq!(tally.winner.worker_name, "Bo");
        assert_eq!(tally.winner.worker_id, "b");
        assert_eq!(tally.winner.vote_count, 2);
        assert!((tally.winner.percentage - 66.7).abs() < 1e-9);
    }

    #[test]
    fn test_self_vote_tie_goes_to_first() {
        let p = [proposal("z", "Zed", Persona::Fast), proposal("a", "Ada", Persona::Fast)];
        let refs: Vec<&Proposal> = p.iter().collect();
        let tally = tally_self_votes(&refs).unwrap();
        assert_eq!(tally.winner.worker_id, "z");
        assert!((tally.winner.percentage - 50.0).abs() < 1e-9);
        assert!(tally_self_votes(&[]).is_none());
    }

    #[tokio::test]
    async fn test_session_runs_all_phases() {
        let workers: Vec<Arc<dyn Worker>> = vec![
            Arc::new(ScriptedWorker::responding(
                WorkerHandle::new("a", "Ada", Persona::Thorough),
                "A secure, robust api with auth.",
            )),
            Arc::new(ScriptedWorker::responding(
                WorkerHandle::new("b", "Bo", Persona::Fast),
                "A minimal MVP, simple and lean.",
            )),
            Arc::new(ScriptedWorker::failing(
                WorkerHandle::new("c", "Cy", Persona::Bold),
                "offline",
            )),
        ];

        let outcome = CollaborationSession::new(
            TaskDescriptor::new("build", "application"),
            workers,
            SessionConfig::default(),
        )
        .run(&CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert_eq!(outcome.proposals.len(), 3);
        assert_eq!(outcome.debates.len(), 1);
        assert!(outcome.debates[0].contrasting);
        assert_eq!(outcome.consensus.approach, "MVP-first");
        assert_eq!(outcome.tally.total_votes(), 2);
        assert_eq!(outcome.tally.winner.worker_id, "a");
        assert!(outcome.winning_proposal().is_some());
    }

    #[tokio::test]
    async fn test_session_without_successes_fails() {
        let workers: Vec<Arc<dyn Worker>> = vec![Arc::new(ScriptedWorker::failing(
            WorkerHandle::new("a", "Ada", Persona::Fast),
            "down",
        ))];
        let err = CollaborationSession::new(
            TaskDescriptor::new("build", "service"),
            workers,
            SessionConfig::default(),
        )
        .run(&CancellationToken::new())
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::NoWorkersAvailable));
    }
}
