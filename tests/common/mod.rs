//! Common test utilities for integration tests
//!
//! Provides scripted rosters, event collection and polling helpers shared
//! across the integration test files.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use chorus::domain::models::{Job, JobOptions, Persona, TaskDescriptor, WorkerHandle};
use chorus::domain::ports::Worker;
use chorus::services::challenge_round::RoundConfig;
use chorus::services::collaboration_session::SessionConfig;
use chorus::services::event_bus::{EventBus, EventBusConfig, EventPayload, UnifiedEvent};
use chorus::services::event_store::InMemoryEventStore;
use chorus::services::pipeline_orchestrator::{OrchestratorConfig, PipelineOrchestrator};
use chorus::{ScriptedWorker, WorkerRoster};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn handle(id: &str, persona: Persona) -> WorkerHandle {
    WorkerHandle::new(id, id.to_uppercase(), persona)
}

pub fn responding(id: &str, text: &str) -> Arc<dyn Worker> {
    Arc::new(ScriptedWorker::responding(handle(id, Persona::Generalist), text))
}

pub fn failing(id: &str) -> Arc<dyn Worker> {
    Arc::new(ScriptedWorker::failing(handle(id, Persona::Generalist), "upstream error"))
}

pub fn hanging(id: &str) -> Arc<dyn Worker> {
    Arc::new(ScriptedWorker::hanging(handle(id, Persona::Generalist)))
}

pub fn roster(workers: Vec<Arc<dyn Worker>>) -> WorkerRoster {
    workers
        .into_iter()
        .fold(WorkerRoster::new(), |roster, worker| roster.with_worker(worker))
}

/// Short timeouts so failure paths resolve quickly.
pub fn fast_config() -> OrchestratorConfig {
    let round = RoundConfig {
        worker_timeout: Duration::from_millis(200),
        ..RoundConfig::default()
    };
    let session = SessionConfig {
        worker_timeout: Duration::from_millis(200),
        ..SessionConfig::default()
    };
    OrchestratorConfig::default()
        .with_round(round)
        .with_session(session)
}

/// Orchestrator with an event store attached so job history can be replayed.
pub fn orchestrator(roster: WorkerRoster, config: OrchestratorConfig) -> PipelineOrchestrator {
    let bus = EventBus::new(EventBusConfig::default()).with_store(Arc::new(InMemoryEventStore::new()));
    PipelineOrchestrator::new(roster, config).with_event_bus(Arc::new(bus))
}

pub fn button_task() -> TaskDescriptor {
    TaskDescriptor::new("create", "component")
        .with_attribute("type", "button")
        .with_attribute("style", "minimal")
}

pub async fn submit(
    orchestrator: &PipelineOrchestrator,
    task: TaskDescriptor,
    options: JobOptions,
) -> Uuid {
    orchestrator
        .submit(task, options, BTreeMap::new())
        .await
        .expect("submit should accept a valid task")
}

/// Poll until the job reaches a terminal state or the timeout elapses.
pub async fn wait_for_terminal(
    orchestrator: &PipelineOrchestrator,
    job_id: Uuid,
    timeout: Duration,
) -> Job {
    wait_for_job(orchestrator, job_id, timeout, |job| job.status.is_terminal()).await
}

/// Poll every 10ms until the predicate holds for the job.
pub async fn wait_for_job<F>(
    orchestrator: &PipelineOrchestrator,
    job_id: Uuid,
    timeout: Duration,
    predicate: F,
) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = orchestrator
            .get_job(job_id)
            .await
            .expect("job should exist while polling");
        if predicate(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {} after {timeout:?}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain every event already buffered on the receiver for one job.
pub fn drain_job_events(
    rx: &mut broadcast::Receiver<UnifiedEvent>,
    job_id: Uuid,
) -> Vec<UnifiedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.job_id == Some(job_id) {
            events.push(event);
        }
    }
    events
}

pub fn event_types(events: &[UnifiedEvent]) -> Vec<&'static str> {
    events.iter().map(UnifiedEvent::event_type).collect()
}

pub fn progress_values(events: &[UnifiedEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e.payload {
            EventPayload::JobStep { progress, .. } => Some(progress),
            _ => None,
        })
        .collect()
}
