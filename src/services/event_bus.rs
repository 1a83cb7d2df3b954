//! EventBus service for job and session event streaming.
//!
//! Provides a broadcast-based event system with sequence numbering and
//! optional persistence to an [`EventStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::event_store::EventStore;
use crate::domain::models::{
    Candidate, Consensus, Debate, JobResult, PipelineVariant, SessionPhase, VoteTally,
};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Job,
    Session,
    Round,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Job => write!(f, "job"),
            Self::Session => write!(f, "session"),
            Self::Round => write!(f, "round"),
        }
    }
}

/// Event envelope containing all event metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub category: EventCategory,
    pub job_id: Option<Uuid>,
    /// Session or round the event belongs to.
    pub session_id: Option<Uuid>,
    pub payload: EventPayload,
}

impl UnifiedEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber::zero(), // Will be assigned by EventBus
            timestamp: Utc::now(),
            severity: payload.severity(),
            category: payload.category(),
            job_id: None,
            session_id: None,
            payload,
        }
    }

    pub fn for_job(mut self, job_id: Option<Uuid>) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn in_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Event payload for every job, session and round event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    // Job lifecycle events
    JobCreated {
        task_summary: String,
    },
    JobStarted,
    JobStep {
        description: String,
        progress: u8,
    },
    JobAwaitingJudgment {
        candidates: Vec<Candidate>,
    },
    JobCompleted {
        result: JobResultPayload,
    },
    JobFailed {
        error: String,
    },
    JobCancelled {
        reason: String,
    },

    // Collaboration session events
    SessionPhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    SessionProposal {
        worker_id: String,
        worker_name: String,
        success: bool,
        timed_out: bool,
        latency_ms: u64,
    },
    SessionDebate {
        debate: Debate,
    },
    SessionConsensus {
        consensus: Consensus,
    },
    SessionVote {
        tally: VoteTally,
    },

    // Challenge round events
    RoundImplementation {
        worker_id: String,
        worker_name: String,
        success: bool,
        total_score: u32,
    },
    RoundJudging {
        implementation_count: usize,
        failed_count: usize,
    },
}

impl EventPayload {
    /// Dotted event name, e.g. `job.created`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job.created",
            Self::JobStarted => "job.started",
            Self::JobStep { .. } => "job.step",
            Self::JobAwaitingJudgment { .. } => "job.awaiting_judgment",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobFailed { .. } => "job.failed",
            Self::JobCancelled { .. } => "job.cancelled",
            Self::SessionPhaseChanged { .. } => "session.phase",
            Self::SessionProposal { .. } => "session.proposal",
            Self::SessionDebate { .. } => "session.debate",
            Self::SessionConsensus { .. } => "session.consensus",
            Self::SessionVote { .. } => "session.vote",
            Self::RoundImplementation { .. } => "round.implementation",
            Self::RoundJudging { .. } => "round.judging",
        }
    }

    fn severity(&self) -> EventSeverity {
        match self {
            Self::JobFailed { .. } => EventSeverity::Error,
            Self::JobCancelled { .. } | Self::JobAwaitingJudgment { .. } => EventSeverity::Warning,
            Self::SessionProposal { success: false, .. }
            | Self::RoundImplementation { success: false, .. } => EventSeverity::Warning,
            Self::JobStep { .. } | Self::SessionPhaseChanged { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    fn category(&self) -> EventCategory {
        match self {
            Self::JobCreated { .. }
            | Self::JobStarted
            | Self::JobStep { .. }
            | Self::JobAwaitingJudgment { .. }
            | Self::JobCompleted { .. }
            | Self::JobFailed { .. }
            | Self::JobCancelled { .. } => EventCategory::Job,
            Self::SessionPhaseChanged { .. }
            | Self::SessionProposal { .. }
            | Self::SessionDebate { .. }
            | Self::SessionConsensus { .. }
            | Self::SessionVote { .. } => EventCategory::Session,
            Self::RoundImplementation { .. } | Self::RoundJudging { .. } => EventCategory::Round,
        }
    }
}

/// Serializable summary of a JobResult (without the full round/session records).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultPayload {
    pub variant: PipelineVariant,
    pub winner_worker_id: String,
    pub artifact_kind: String,
    pub artifact_record_id: Option<String>,
    pub deployment_url: Option<String>,
}

impl From<&JobResult> for JobResultPayload {
    fn from(result: &JobResult) -> Self {
        Self {
            variant: result.variant,
            winner_worker_id: result.winner_worker_id.clone(),
            artifact_kind: result.artifact.kind.clone(),
            artifact_record_id: result.artifact_record.as_ref().map(|r| r.id.clone()),
            deployment_url: result.deployment_url.clone(),
        }
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
    /// Whether to persist events to storage.
    pub persist_events: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            persist_events: true,
        }
    }
}

/// Central event bus for broadcasting events to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
    store: Option<Arc<dyn EventStore>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
            store: None,
            config,
        }
    }

    /// Add an event store for persistence.
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish an event.
    pub async fn publish(&self, mut event: UnifiedEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);

        if self.config.persist_events {
            if let Some(ref store) = self.store {
                if let Err(e) = store.append(&event).await {
                    tracing::warn!("Failed to persist event: {}", e);
                }
            }
        }

        tracing::trace!(
            sequence = seq,
            event_type = event.event_type(),
            job_id = ?event.job_id,
            "Publishing event"
        );

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the event store if configured.
    pub fn store(&self) -> Option<Arc<dyn EventStore>> {
        self.store.clone()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_store::{EventQuery, InMemoryEventStore};

    #[tokio::test]
    async fn test_event_bus_sequence_assignment() {
        let bus = EventBus::new(EventBusConfig::default());

        assert_eq!(bus.current_sequence().0, 0);

        let mut rx = bus.subscribe();

        bus.publish(UnifiedEvent::new(EventPayload::JobStarted)).await;
        let event1 = rx.recv().await.unwrap();
        assert_eq!(event1.sequence.0, 0);

        bus.publish(UnifiedEvent::new(EventPayload::JobFailed {
            error: "boom".to_string(),
        }))
        .await;
        let event2 = rx.recv().await.unwrap();
        assert_eq!(event2.sequence.0, 1);

        assert_eq!(bus.current_sequence().0, 2);
    }

    #[tokio::test]
    async fn test_event_bus_persists_to_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = EventBus::new(EventBusConfig::default()).with_store(store.clone());
        let job_id = Uuid::new_v4();

        bus.publish(UnifiedEvent::new(EventPayload::JobStarted).for_job(Some(job_id)))
            .await;
        bus.publish(UnifiedEvent::new(EventPayload::JobStarted)).await;

        let events = store.query(EventQuery::new().job_id(job_id)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job_id, Some(job_id));
    }

    #[test]
    fn test_payload_classification() {
        let failed = UnifiedEvent::new(EventPayload::JobFailed {
            error: "x".to_string(),
        });
        assert_eq!(failed.severity, EventSeverity::Error);
        assert_eq!(failed.category, EventCategory::Job);
        assert_eq!(failed.event_type(), "job.failed");

        let proposal = UnifiedEvent::new(EventPayload::SessionProposal {
            worker_id: "w1".to_string(),
            worker_name: "Ada".to_string(),
            success: false,
            timed_out: true,
            latency_ms: 10,
        });
        assert_eq!(proposal.severity, EventSeverity::Warning);
        assert_eq!(proposal.category, EventCategory::Session);
        assert_eq!(proposal.event_type(), "session.proposal");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        tokio_test::block_on(bus.publish(UnifiedEvent::new(EventPayload::JobStarted)));
        assert_eq!(bus.current_sequence().0, 1);
    }
}
