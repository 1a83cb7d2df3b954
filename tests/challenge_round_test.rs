//! Integration tests for the challenge round: partial failure tolerance,
//! scoring and round events.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use chorus::domain::models::{ImplementationStatus, RoundStatus, TaskDescriptor};
use chorus::domain::ports::Worker;
use chorus::services::challenge_round::{ChallengeRound, RoundConfig};
use chorus::services::event_bus::{EventBus, EventPayload};
use chorus::services::scoring::ScoringRuleset;

use common::{failing, hanging, responding};

const COMPONENT: &str = "// Primary action button\n\
    export function Button({ label, onClick }) {\n\
      return <button className=\"btn\" onClick={onClick}>{label}</button>;\n\
    }";

fn config() -> RoundConfig {
    RoundConfig {
        worker_timeout: Duration::from_millis(200),
        ..RoundConfig::default()
    }
    .with_ruleset(ScoringRuleset::default().with_required_signals(vec!["onClick".to_string()]))
}

#[tokio::test]
async fn test_round_survives_partial_failure() {
    let workers: Vec<Arc<dyn Worker>> = (0..12)
        .map(|i| {
            if i % 3 == 1 {
                failing(&format!("w{i}"))
            } else {
                responding(&format!("w{i}"), COMPONENT)
            }
        })
        .collect();

    let round = ChallengeRound::new(TaskDescriptor::new("create", "component"), workers, config());
    let mut outcome = round.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.status, RoundStatus::Judging);
    assert_eq!(outcome.implementations.len(), 12);
    assert_eq!(outcome.failed_count(), 4);

    for implementation in &outcome.implementations {
        match implementation.status {
            ImplementationStatus::Failed => {
                assert_eq!(implementation.total_score, 0);
                let message = implementation.message.as_deref().unwrap();
                assert!(message.starts_with(&format!("Worker {} failed:", implementation.worker_id)));
                assert!(message.contains("upstream error"));
            }
            ImplementationStatus::Succeeded => assert!(implementation.total_score > 0),
        }
    }

    let winner = ChallengeRound::select_winner(&mut outcome).unwrap();
    assert_eq!(winner.status, ImplementationStatus::Succeeded);
    assert!(winner.total_score > 0);
    assert_eq!(winner.worker_id, "w0", "ties go to roster order");
    assert_eq!(outcome.status, RoundStatus::Decided);
}

#[tokio::test]
async fn test_round_records_timeouts() {
    let workers = vec![responding("a", COMPONENT), hanging("b")];

    let round = ChallengeRound::new(TaskDescriptor::new("create", "component"), workers, config());
    let outcome = round.run(&CancellationToken::new()).await.unwrap();

    let timed_out = &outcome.implementations[1];
    assert!(timed_out.timed_out);
    assert_eq!(timed_out.total_score, 0);
    assert_eq!(timed_out.status, ImplementationStatus::Failed);
}

#[tokio::test]
async fn test_required_signal_changes_ranking() {
    let without_signal = "// Primary action button\n\
        export function Button({ label }) {\n\
          return <button className=\"btn\">{label}</button>;\n\
        }";
    let workers = vec![responding("plain", without_signal), responding("wired", COMPONENT)];

    let round = ChallengeRound::new(TaskDescriptor::new("create", "component"), workers, config());
    let mut outcome = round.run(&CancellationToken::new()).await.unwrap();

    let plain = &outcome.implementations[0];
    let wired = &outcome.implementations[1];
    assert!(!plain.uses_required_signals);
    assert!(wired.uses_required_signals);
    assert_eq!(wired.total_score, plain.total_score + 15);

    let winner = ChallengeRound::select_winner(&mut outcome).unwrap();
    assert_eq!(winner.worker_id, "wired");
}

#[tokio::test]
async fn test_round_emits_one_event_per_worker() {
    let workers = vec![responding("a", COMPONENT), failing("b"), responding("c", "short")];
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();

    let round = ChallengeRound::new(TaskDescriptor::new("create", "component"), workers, config())
        .with_event_bus(bus);
    let round_id = round.id();
    round.run(&CancellationToken::new()).await.unwrap();

    let mut implementations = 0;
    let mut judging = None;
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.session_id, Some(round_id));
        match event.payload {
            EventPayload::RoundImplementation { .. } => implementations += 1,
            EventPayload::RoundJudging {
                implementation_count,
                failed_count,
            } => judging = Some((implementation_count, failed_count)),
            other => panic!("unexpected event {}", other.event_type()),
        }
    }
    assert_eq!(implementations, 3);
    assert_eq!(judging, Some((3, 1)));
}
