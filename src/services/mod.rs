//! Services: the engines and orchestrators of the pipeline.

pub mod challenge_round;
pub mod collaboration_session;
pub mod event_bus;
pub mod event_store;
pub mod pipeline_orchestrator;
pub mod scoring;
pub mod worker_pool;

pub use challenge_round::{ChallengeRound, RoundConfig};
pub use collaboration_session::{CollaborationSession, SessionConfig};
pub use event_bus::{
    EventBus, EventBusConfig, EventCategory, EventPayload, EventSeverity, SequenceNumber,
    UnifiedEvent,
};
pub use event_store::{EventQuery, EventStore, EventStoreError, InMemoryEventStore};
pub use pipeline_orchestrator::{OrchestratorConfig, PipelineOrchestrator, CANCEL_REASON};
pub use scoring::{KeywordTable, ScoringRule, ScoringRuleset};
pub use worker_pool::{FanOut, FanOutObserver, NoopObserver, WorkerClient, WorkerPool, WorkerRequest};
