//! `chorus run`: submit one task and follow its job to a terminal state.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::adapters::{FileDeployer, InMemoryArtifactStore, WorkerRoster};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Candidate, Config, Job, JobOptions, JobStatus, TaskDescriptor};
use crate::services::event_bus::{EventBus, EventBusConfig, EventPayload, UnifiedEvent};
use crate::services::event_store::InMemoryEventStore;
use crate::services::pipeline_orchestrator::{OrchestratorConfig, PipelineOrchestrator};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What to do, e.g. "create"
    #[arg(short, long)]
    pub action: String,

    /// Artifact kind, e.g. "component" or "application"
    #[arg(short, long)]
    pub kind: String,

    /// Where the artifact applies, e.g. "navigation bar"
    #[arg(short, long)]
    pub scope: Option<String>,

    /// Task attribute as key=value (repeatable)
    #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,

    /// Stop at the judging stage instead of picking a winner automatically
    #[arg(long)]
    pub manual_judge: bool,

    /// Worker id to pick when judging manually (defaults to the top-scored candidate)
    #[arg(long, requires = "manual_judge")]
    pub pick: Option<String>,

    /// Deploy the artifact after assembly
    #[arg(long)]
    pub deploy: bool,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("attribute key cannot be empty in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

impl RunArgs {
    pub fn task(&self) -> TaskDescriptor {
        let mut task = TaskDescriptor::new(self.action.clone(), self.kind.clone());
        if let Some(scope) = &self.scope {
            task = task.with_scope(scope.clone());
        }
        for (key, value) in &self.attributes {
            task = task.with_attribute(key.clone(), value.clone());
        }
        task
    }

    pub fn options(&self, config: &Config) -> JobOptions {
        JobOptions {
            auto_judge: config.pipeline.auto_judge && !self.manual_judge,
            auto_deploy: config.pipeline.auto_deploy || self.deploy,
        }
    }
}

/// Wire the orchestrator and its collaborators from configuration.
pub fn build_orchestrator(config: &Config) -> Result<PipelineOrchestrator> {
    let roster = WorkerRoster::from_config(&config.workers);
    if roster.is_empty() {
        anyhow::bail!("No workers configured. Add entries under `workers` in .chorus/config.yaml");
    }

    let mut bus = EventBus::new(EventBusConfig {
        channel_capacity: config.events.channel_capacity,
        persist_events: config.events.persist_events,
    });
    if config.events.persist_events {
        bus = bus.with_store(Arc::new(InMemoryEventStore::new()));
    }

    let mut orchestrator =
        PipelineOrchestrator::new(roster, OrchestratorConfig::from_config(config))
            .with_event_bus(Arc::new(bus))
            .with_artifact_store(Arc::new(InMemoryArtifactStore::new()));
    if let Some(dir) = &config.deploy.output_dir {
        orchestrator = orchestrator.with_deployer(Arc::new(FileDeployer::new(dir)));
    }
    Ok(orchestrator)
}

#[derive(Debug, Serialize)]
pub struct JobOutput {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub variant: Option<String>,
    pub progress: u8,
    pub winner_worker_id: Option<String>,
    pub deployment_url: Option<String>,
    pub error: Option<String>,
    pub cancel_reason: Option<String>,
    pub steps: Vec<String>,
    pub payload: Option<String>,
}

impl From<&Job> for JobOutput {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            variant: job.variant.map(|v| v.as_str().to_string()),
            progress: job.progress_percent,
            winner_worker_id: job.result.as_ref().map(|r| r.winner_worker_id.clone()),
            deployment_url: job.result.as_ref().and_then(|r| r.deployment_url.clone()),
            error: job.error.clone(),
            cancel_reason: job.cancel_reason.clone(),
            steps: job
                .step_log
                .iter()
                .map(|s| format!("{:>3}% {}", s.progress, s.description))
                .collect(),
            payload: job.result.as_ref().map(|r| r.artifact.payload.clone()),
        }
    }
}

impl CommandOutput for JobOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Job {} {}", self.job_id, self.status)];
        if let Some(ref variant) = self.variant {
            lines.push(format!("  Variant:    {variant}"));
        }
        lines.push(format!("  Progress:   {}%", self.progress));
        if let Some(ref winner) = self.winner_worker_id {
            lines.push(format!("  Winner:     {winner}"));
        }
        if let Some(ref url) = self.deployment_url {
            lines.push(format!("  Deployed:   {url}"));
        }
        if let Some(ref error) = self.error {
            lines.push(format!("  Error:      {error}"));
        }
        if let Some(ref reason) = self.cancel_reason {
            lines.push(format!("  Cancelled:  {reason}"));
        }
        if !self.steps.is_empty() {
            lines.push("  Steps:".to_string());
            lines.extend(self.steps.iter().map(|s| format!("    {s}")));
        }
        if let Some(ref payload) = self.payload {
            lines.push(String::new());
            lines.push(payload.clone());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// One-line rendering of a streamed event.
pub fn describe_event(event: &UnifiedEvent) -> String {
    let detail = match &event.payload {
        EventPayload::JobCreated { task_summary } => task_summary.clone(),
        EventPayload::JobStarted => String::new(),
        EventPayload::JobStep {
            description,
            progress,
        } => format!("{progress:>3}% {description}"),
        EventPayload::JobAwaitingJudgment { candidates } => {
            let names: Vec<String> = candidates
                .iter()
                .map(|c| format!("{} ({})", c.worker_id, c.score))
                .collect();
            format!("candidates: {}", names.join(", "))
        }
        EventPayload::JobCompleted { result } => format!("winner {}", result.winner_worker_id),
        EventPayload::JobFailed { error } => error.clone(),
        EventPayload::JobCancelled { reason } => reason.clone(),
        EventPayload::SessionPhaseChanged { from, to } => format!("{from} -> {to}"),
        EventPayload::SessionProposal {
            worker_name,
            success,
            timed_out,
            latency_ms,
            ..
        } => {
            let state = match (success, timed_out) {
                (true, _) => "ok",
                (false, true) => "timed out",
                (false, false) => "failed",
            };
            format!("{worker_name} {state} in {latency_ms}ms")
        }
        EventPayload::SessionDebate { debate } => format!(
            "{} vs {}: {}",
            debate.first_worker_id,
            debate.second_worker_id,
            truncate(&debate.talking_point, 60)
        ),
        EventPayload::SessionConsensus { consensus } => format!(
            "{} (confidence {:.2})",
            consensus.approach, consensus.confidence
        ),
        EventPayload::SessionVote { tally } => format!(
            "{} wins with {} votes ({:.1}%)",
            tally.winner.worker_name, tally.winner.vote_count, tally.winner.percentage
        ),
        EventPayload::RoundImplementation {
            worker_name,
            success,
            total_score,
            ..
        } => {
            if *success {
                format!("{worker_name} scored {total_score}")
            } else {
                format!("{worker_name} failed")
            }
        }
        EventPayload::RoundJudging {
            implementation_count,
            failed_count,
        } => format!("{implementation_count} implementations, {failed_count} failed"),
    };
    format!("[{:>4}] {:<22} {}", event.sequence.0, event.event_type(), detail)
        .trim_end()
        .to_string()
}

/// The manual pick, or the top-scored candidate when none was given.
fn choose_candidate(pick: Option<&str>, candidates: &[Candidate]) -> Option<String> {
    match pick {
        Some(id) => Some(id.to_string()),
        None => candidates
            .iter()
            .fold(None::<&Candidate>, |best, c| match best {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            })
            .map(|c| c.worker_id.clone()),
    }
}

fn is_terminal_event(payload: &EventPayload) -> bool {
    matches!(
        payload,
        EventPayload::JobCompleted { .. }
            | EventPayload::JobFailed { .. }
            | EventPayload::JobCancelled { .. }
    )
}

/// Stream a job's events until it ends, answering its judgment request.
///
/// When the receiver lags, the job's stored state stands in for the skipped
/// events so a dropped judgment request or terminal event cannot stall the loop.
async fn follow_job(
    orchestrator: &PipelineOrchestrator,
    job_id: Uuid,
    mut events: broadcast::Receiver<UnifiedEvent>,
    pick: Option<&str>,
    json_mode: bool,
) -> Result<()> {
    let mut judged = false;

    loop {
        let event = tokio::select! {
            received = events.recv() => received,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(job_id = %job_id, "Interrupted, cancelling job");
                orchestrator.cancel(job_id).await;
                return Ok(());
            }
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event stream lagged, reading job state");
                let job = orchestrator
                    .get_job(job_id)
                    .await
                    .with_context(|| format!("Job {job_id} disappeared"))?;
                if job.status.is_terminal() {
                    return Ok(());
                }
                if job.status == JobStatus::AwaitingJudgment {
                    judge_once(orchestrator, job_id, pick, &job.candidates, &mut judged).await?;
                }
                continue;
            }
            Err(RecvError::Closed) => return Ok(()),
        };
        if event.job_id != Some(job_id) {
            continue;
        }

        if !json_mode {
            println!("{}", describe_event(&event));
        }

        if let EventPayload::JobAwaitingJudgment { candidates } = &event.payload {
            judge_once(orchestrator, job_id, pick, candidates, &mut judged).await?;
        }

        if is_terminal_event(&event.payload) {
            return Ok(());
        }
    }
}

/// A job awaits judgment once; later requests for it are ignored.
async fn judge_once(
    orchestrator: &PipelineOrchestrator,
    job_id: Uuid,
    pick: Option<&str>,
    candidates: &[Candidate],
    judged: &mut bool,
) -> Result<()> {
    if *judged {
        return Ok(());
    }
    let chosen =
        choose_candidate(pick, candidates).context("No candidates offered for judgment")?;
    orchestrator
        .judge(job_id, &chosen)
        .await
        .with_context(|| format!("Failed to judge job {job_id} for '{chosen}'"))?;
    *judged = true;
    Ok(())
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let task = args.task();
    let options = args.options(config);

    // Subscribe first so no early event is missed.
    let events = orchestrator.subscribe();
    let job_id = orchestrator
        .submit(task, options, BTreeMap::new())
        .await
        .context("Failed to submit task")?;

    follow_job(&orchestrator, job_id, events, args.pick.as_deref(), json_mode).await?;

    let job = orchestrator
        .get_job(job_id)
        .await
        .with_context(|| format!("Job {job_id} disappeared"))?;
    output(&JobOutput::from(&job), json_mode);

    match job.status {
        JobStatus::Completed => Ok(()),
        status => anyhow::bail!(
            "Job {job_id} ended {status}: {}",
            job.error
                .or(job.cancel_reason)
                .unwrap_or_else(|| "no details".to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{WorkerConfig, WorkerKind};

    fn echo_worker(id: &str, persona: &str) -> WorkerConfig {
        WorkerConfig {
            id: id.to_string(),
            name: None,
            persona: Some(persona.to_string()),
            domain: None,
            kind: WorkerKind::Echo,
            endpoint: None,
            model: None,
            enabled: true,
        }
    }

    fn candidate(id: &str, score: u32) -> Candidate {
        Candidate {
            worker_id: id.to_string(),
            worker_name: id.to_string(),
            score,
            excerpt: String::new(),
            payload: String::new(),
        }
    }

    #[test]
    fn test_parse_attribute() {
        assert_eq!(
            parse_attribute("type = button").unwrap(),
            ("type".to_string(), "button".to_string())
        );
        assert!(parse_attribute("no-equals").is_err());
        assert!(parse_attribute("=value").is_err());
    }

    #[test]
    fn test_choose_candidate_prefers_pick_then_first_top_score() {
        let candidates = vec![candidate("a", 10), candidate("b", 30), candidate("c", 30)];
        assert_eq!(choose_candidate(Some("a"), &candidates).as_deref(), Some("a"));
        assert_eq!(choose_candidate(None, &candidates).as_deref(), Some("b"));
        assert_eq!(choose_candidate(None, &[]), None);
    }

    #[test]
    fn test_options_merge_flags_with_config() {
        let args = RunArgs {
            action: "create".to_string(),
            kind: "component".to_string(),
            scope: Some("header".to_string()),
            attributes: vec![("type".to_string(), "button".to_string())],
            manual_judge: true,
            pick: None,
            deploy: true,
        };
        let options = args.options(&Config::default());
        assert!(!options.auto_judge);
        assert!(options.auto_deploy);
        assert_eq!(args.task().summary(), "create component in header (type=button)");
    }

    #[test]
    fn test_build_orchestrator_requires_workers() {
        assert!(build_orchestrator(&Config::default()).is_err());
    }

    #[tokio::test]
    async fn test_follow_job_recovers_from_lagged_stream() {
        let mut config = Config::default();
        config.workers = vec![echo_worker("ada", "thorough"), echo_worker("bo", "fast")];
        config.events.channel_capacity = 1;
        let orchestrator = build_orchestrator(&config).unwrap();

        let events = orchestrator.subscribe();
        let options = JobOptions {
            auto_judge: false,
            auto_deploy: false,
        };
        let job_id = orchestrator
            .submit(TaskDescriptor::new("create", "application"), options, BTreeMap::new())
            .await
            .unwrap();

        // Let the session overflow the one-slot channel before reading it.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while orchestrator.get_job(job_id).await.unwrap().status != JobStatus::AwaitingJudgment {
            assert!(tokio::time::Instant::now() < deadline, "job never awaited judgment");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            follow_job(&orchestrator, job_id, events, Some("bo"), true),
        )
        .await
        .expect("following a lagged stream should finish")
        .unwrap();

        let job = orchestrator.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().winner_worker_id, "bo");
    }

    #[tokio::test]
    async fn test_follow_job_stops_on_terminal_job_after_lag() {
        let mut config = Config::default();
        config.workers = vec![echo_worker("ada", "thorough"), echo_worker("bo", "fast")];
        config.events.channel_capacity = 1;
        let orchestrator = build_orchestrator(&config).unwrap();

        let events = orchestrator.subscribe();
        let job_id = orchestrator
            .submit(
                TaskDescriptor::new("create", "application"),
                JobOptions::default(),
                BTreeMap::new(),
            )
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while !orchestrator.get_job(job_id).await.unwrap().status.is_terminal() {
            assert!(tokio::time::Instant::now() < deadline, "job never finished");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            follow_job(&orchestrator, job_id, events, None, true),
        )
        .await
        .expect("a finished job should end the stream")
        .unwrap();
    }

    #[tokio::test]
    async fn test_echo_roster_completes_end_to_end() {
        let mut config = Config::default();
        config.workers = vec![echo_worker("ada", "thorough"), echo_worker("bo", "fast")];
        let orchestrator = build_orchestrator(&config).unwrap();

        let mut events = orchestrator.subscribe();
        let job_id = orchestrator
            .submit(
                TaskDescriptor::new("create", "application"),
                JobOptions::default(),
                BTreeMap::new(),
            )
            .await
            .unwrap();

        loop {
            let event = events.recv().await.unwrap();
            if event.job_id == Some(job_id) && is_terminal_event(&event.payload) {
                assert_eq!(event.event_type(), "job.completed");
                break;
            }
        }

        let job = orchestrator.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let rendered = JobOutput::from(&job).to_human();
        assert!(rendered.contains("collaboration_session"));
        assert!(!orchestrator.events_for(job_id).await.is_empty());
    }
}
