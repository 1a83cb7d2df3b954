//! EventStore trait for event persistence.
//!
//! Defines the interface for storing and querying unified events, and an
//! in-memory implementation used for job event replay.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::event_bus::{EventCategory, SequenceNumber, UnifiedEvent};

/// Error type for EventStore operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Failed to append event: {0}")]
    AppendError(String),

    #[error("Failed to query events: {0}")]
    QueryError(String),
}

/// Query parameters for event retrieval.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by minimum sequence number (inclusive).
    pub since_sequence: Option<SequenceNumber>,
    /// Filter by job ID.
    pub job_id: Option<Uuid>,
    /// Filter by session or round ID.
    pub session_id: Option<Uuid>,
    /// Filter by category.
    pub category: Option<EventCategory>,
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since_sequence(mut self, seq: SequenceNumber) -> Self {
        self.since_sequence = Some(seq);
        self
    }

    pub fn job_id(mut self, id: Uuid) -> Self {
        self.job_id = Some(id);
        self
    }

    pub fn session_id(mut self, id: Uuid) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn category(mut self, category: EventCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &UnifiedEvent) -> bool {
        if let Some(seq) = self.since_sequence {
            if event.sequence < seq {
                return false;
            }
        }
        if let Some(job_id) = self.job_id {
            if event.job_id != Some(job_id) {
                return false;
            }
        }
        if let Some(session_id) = self.session_id {
            if event.session_id != Some(session_id) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category != category {
                return false;
            }
        }
        true
    }
}

/// Trait for event persistence backends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event to the store.
    async fn append(&self, event: &UnifiedEvent) -> Result<(), EventStoreError>;

    /// Query events, ordered by sequence.
    async fn query(&self, query: EventQuery) -> Result<Vec<UnifiedEvent>, EventStoreError>;

    /// Total number of stored events.
    async fn count(&self) -> Result<usize, EventStoreError>;

    /// Drop every event belonging to a job.
    async fn forget_job(&self, job_id: Uuid) -> Result<usize, EventStoreError>;
}

/// In-memory event store.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: tokio::sync::RwLock<Vec<UnifiedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &UnifiedEvent) -> Result<(), EventStoreError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<UnifiedEvent>, EventStoreError> {
        let events = self.events.read().await;
        let mut result: Vec<_> = events.iter().filter(|e| query.matches(e)).cloned().collect();
        result.sort_by_key(|e| e.sequence);
        if let Some(limit) = query.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn count(&self) -> Result<usize, EventStoreError> {
        Ok(self.events.read().await.len())
    }

    async fn forget_job(&self, job_id: Uuid) -> Result<usize, EventStoreError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.job_id != Some(job_id));
        Ok(before - events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_bus::EventPayload;

    fn make_test_event(seq: u64, job_id: Option<Uuid>) -> UnifiedEvent {
        let mut event = UnifiedEvent::new(EventPayload::JobStep {
            description: format!("step {seq}"),
            progress: 10,
        })
        .for_job(job_id);
        event.sequence = SequenceNumber(seq);
        event
    }

    #[tokio::test]
    async fn test_in_memory_store_query() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();

        store.append(&make_test_event(0, Some(job))).await.unwrap();
        store.append(&make_test_event(1, None)).await.unwrap();
        store.append(&make_test_event(2, Some(job))).await.unwrap();

        let all = store.query(EventQuery::new()).await.unwrap();
        assert_eq!(all.len(), 3);

        let for_job = store.query(EventQuery::new().job_id(job)).await.unwrap();
        assert_eq!(for_job.len(), 2);

        let since = store
            .query(EventQuery::new().since_sequence(SequenceNumber(1)).limit(1))
            .await
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].sequence, SequenceNumber(1));
    }

    #[tokio::test]
    async fn test_forget_job() {
        let store = InMemoryEventStore::new();
        let job = Uuid::new_v4();
        store.append(&make_test_event(0, Some(job))).await.unwrap();
        store.append(&make_test_event(1, None)).await.unwrap();

        assert_eq!(store.forget_job(job).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
