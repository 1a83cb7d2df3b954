//! Final artifacts and judge-able candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::implementation::Implementation;
use super::proposal::{excerpt, Proposal};

/// Final output of a job, handed to persistence and deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: String,
    pub source_worker: String,
    pub payload: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Receipt returned by an artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub stored_at: DateTime<Utc>,
}

/// A candidate offered for judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub worker_id: String,
    pub worker_name: String,
    /// Ruleset score for round implementations, vote count for session proposals.
    pub score: u32,
    pub excerpt: String,
    #[serde(skip)]
    pub payload: String,
}

impl From<&Implementation> for Candidate {
    fn from(implementation: &Implementation) -> Self {
        Self {
            worker_id: implementation.worker_id.clone(),
            worker_name: implementation.worker_name.clone(),
            score: implementation.total_score,
            excerpt: excerpt(&implementation.code, 120),
            payload: implementation.code.clone(),
        }
    }
}

impl Candidate {
    pub fn from_proposal(proposal: &Proposal, votes: u32) -> Self {
        Self {
            worker_id: proposal.worker_id.clone(),
            worker_name: proposal.worker_name.clone(),
            score: votes,
            excerpt: proposal.excerpt(),
            payload: proposal.text.clone(),
        }
    }
}
