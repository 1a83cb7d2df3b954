//! One worker's response to a prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::worker::{Persona, WorkerHandle};

/// A worker response, successful or not.
///
/// Created by the worker client and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub worker_id: String,
    pub worker_name: String,
    pub persona: Persona,
    pub text: String,
    pub latency_ms: u64,
    pub timed_out: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    pub fn succeeded(worker: &WorkerHandle, text: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            worker_id: worker.id.clone(),
            worker_name: worker.name.clone(),
            persona: worker.persona,
            text: text.into(),
            latency_ms,
            timed_out: false,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(worker: &WorkerHandle, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            worker_id: worker.id.clone(),
            worker_name: worker.name.clone(),
            persona: worker.persona,
            text: String::new(),
            latency_ms,
            timed_out: false,
            error_message: Some(error.into()),
            created_at: Utc::now(),
        }
    }

    pub fn timed_out(worker: &WorkerHandle, timeout_ms: u64, latency_ms: u64) -> Self {
        Self {
            worker_id: worker.id.clone(),
            worker_name: worker.name.clone(),
            persona: worker.persona,
            text: String::new(),
            latency_ms,
            timed_out: true,
            error_message: Some(format!("Worker timed out after {timeout_ms}ms")),
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && self.error_message.is_none()
    }

    /// First sentence (or first 120 chars) of the response.
    pub fn excerpt(&self) -> String {
        excerpt(&self.text, 120)
    }
}

pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let first = trimmed
        .split_terminator(['.', '\n'])
        .next()
        .unwrap_or(trimmed)
        .trim();
    if first.chars().count() <= max_chars {
        first.to_string()
    } else {
        let cut: String = first.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> WorkerHandle {
        WorkerHandle::new("w1", "Ada", Persona::Thorough)
    }

    #[test]
    fn test_success_flags() {
        assert!(Proposal::succeeded(&worker(), "ok", 10).is_success());
        assert!(!Proposal::failed(&worker(), "boom", 10).is_success());

        let timed_out = Proposal::timed_out(&worker(), 100, 101);
        assert!(!timed_out.is_success());
        assert!(timed_out.timed_out);
        assert!(timed_out.error_message.is_some());
    }

    #[test]
    fn test_excerpt_takes_first_sentence() {
        let p = Proposal::succeeded(&worker(), "Use a flat layout. Then add icons.", 5);
        assert_eq!(p.excerpt(), "Use a flat layout");
        assert_eq!(excerpt("abcdefghij", 6), "abc...");
    }
}
