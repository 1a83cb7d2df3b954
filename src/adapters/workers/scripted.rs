//! Scripted in-process workers.
//!
//! Deterministic workers for tests and offline runs. A shared
//! [`ConcurrencyTracker`] records how many calls overlap.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::errors::WorkerError;
use crate::domain::models::WorkerHandle;
use crate::domain::ports::Worker;

/// What a scripted worker does when called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedBehavior {
    /// Return the text.
    Respond(String),
    /// Return a transport error with the message.
    Fail(String),
    /// Never resolve.
    Hang,
    /// Answer with a templated response built from the prompt.
    Echo,
}

/// Records in-flight calls across a set of workers.
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            tracker: self.clone(),
        }
    }

    /// Calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Total calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count on drop, including when a call is timed out.
struct InFlightGuard {
    tracker: Arc<ConcurrencyTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A worker that follows a script.
pub struct ScriptedWorker {
    handle: WorkerHandle,
    behavior: ScriptedBehavior,
    delay: Duration,
    tracker: Option<Arc<ConcurrencyTracker>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new(handle: WorkerHandle, behavior: ScriptedBehavior) -> Self {
        Self {
            handle,
            behavior,
            delay: Duration::ZERO,
            tracker: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(handle: WorkerHandle, text: impl Into<String>) -> Self {
        Self::new(handle, ScriptedBehavior::Respond(text.into()))
    }

    pub fn failing(handle: WorkerHandle, message: impl Into<String>) -> Self {
        Self::new(handle, ScriptedBehavior::Fail(message.into()))
    }

    pub fn hanging(handle: WorkerHandle) -> Self {
        Self::new(handle, ScriptedBehavior::Hang)
    }

    pub fn echo(handle: WorkerHandle) -> Self {
        Self::new(handle, ScriptedBehavior::Echo)
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<ConcurrencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn echo_response(&self, prompt: &str) -> String {
        let subject = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Task: "))
            .unwrap_or("the task")
            .trim();
        format!(
            "{} suggests a {} approach to {}: {}.",
            self.handle.name,
            self.handle.persona,
            subject,
            self.handle.persona.stance()
        )
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    async fn generate(&self, prompt: &str) -> Result<String, WorkerError> {
        let _guard = self.tracker.as_ref().map(ConcurrencyTracker::enter);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behavior {
            ScriptedBehavior::Respond(text) => Ok(text.clone()),
            ScriptedBehavior::Fail(message) => Err(WorkerError::Transport(message.clone())),
            ScriptedBehavior::Hang => {
                futures::future::pending::<()>().await;
                Err(WorkerError::Unavailable("hung worker resumed".to_string()))
            }
            ScriptedBehavior::Echo => Ok(self.echo_response(prompt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Persona;

    #[tokio::test]
    async fn test_tracker_counts_overlap() {
        let tracker = Arc::new(ConcurrencyTracker::new());
        let a = ScriptedWorker::responding(WorkerHandle::new("a", "A", Persona::Fast), "x")
            .with_delay(Duration::from_millis(30))
            .with_tracker(tracker.clone());
        let b = ScriptedWorker::responding(WorkerHandle::new("b", "B", Persona::Bold), "y")
            .with_delay(Duration::from_millis(30))
            .with_tracker(tracker.clone());

        let (ra, rb) = tokio::join!(a.generate("p"), b.generate("p"));
        assert_eq!(ra.unwrap(), "x");
        assert_eq!(rb.unwrap(), "y");
        assert_eq!(tracker.high_water(), 2);
        assert_eq!(tracker.calls(), 2);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_echo_uses_task_line() {
        let worker = ScriptedWorker::echo(WorkerHandle::new("e", "Echo", Persona::Minimalist));
        let text = worker
            .generate("Role: x\nTask: create component\nMore")
            .await
            .unwrap();
        assert!(text.contains("create component"));
        assert!(text.contains("minimalist"));
        assert_eq!(worker.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_worker_returns_error() {
        let worker = ScriptedWorker::failing(WorkerHandle::new("f", "F", Persona::Fast), "down");
        assert!(matches!(
            worker.generate("p").await,
            Err(WorkerError::Transport(msg)) if msg == "down"
        ));
    }
}
