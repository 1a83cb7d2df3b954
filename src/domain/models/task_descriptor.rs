//! Structured task input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::{PipelineError, PipelineResult};

/// Structured description of the work to fan out.
///
/// Produced by an upstream intent extractor and immutable once a job starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub action: String,
    pub artifact_kind: String,
    #[serde(default)]
    pub target_scope: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl TaskDescriptor {
    pub fn new(action: impl Into<String>, artifact_kind: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            artifact_kind: artifact_kind.into(),
            target_scope: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.target_scope = Some(scope.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.action.trim().is_empty() {
            return Err(PipelineError::InvalidTask("action cannot be empty".to_string()));
        }
        if self.artifact_kind.trim().is_empty() {
            return Err(PipelineError::InvalidTask(
                "artifact kind cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Short human-readable summary, e.g. `create component (type=button, style=minimal)`.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} {}", self.action.trim(), self.artifact_kind.trim());
        if let Some(scope) = self.target_scope.as_deref().filter(|s| !s.trim().is_empty()) {
            summary.push_str(&format!(" in {}", scope.trim()));
        }
        if !self.attributes.is_empty() {
            let attrs: Vec<String> = self
                .attributes
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            summary.push_str(&format!(" ({})", attrs.join(", ")));
        }
        summary
    }
}

/// Which generation strategy a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// Single-phase scored fan-out.
    ChallengeRound,
    /// Four-phase proposal, debate, consensus and vote.
    CollaborationSession,
}

impl PipelineVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChallengeRound => "challenge_round",
            Self::CollaborationSession => "collaboration_session",
        }
    }

    /// Pick the variant for an artifact kind given the configured collaborative kinds.
    pub fn classify(artifact_kind: &str, collaborative_kinds: &[String]) -> Self {
        let kind = artifact_kind.trim();
        if collaborative_kinds
            .iter()
            .any(|k| k.trim().eq_ignore_ascii_case(kind))
        {
            Self::CollaborationSession
        } else {
            Self::ChallengeRound
        }
    }
}

impl std::fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
