//! Collaboration session records: debates, themes, consensus and votes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::proposal::Proposal;

/// Phase of a collaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Created,
    GatheringProposals,
    Debating,
    ConsensusBuilding,
    Voting,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::GatheringProposals => "gathering_proposals",
            Self::Debating => "debating",
            Self::ConsensusBuilding => "consensus_building",
            Self::Voting => "voting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(&self) -> Vec<SessionPhase> {
        match self {
            Self::Created => vec![Self::GatheringProposals, Self::Failed],
            Self::GatheringProposals => vec![Self::Debating, Self::ConsensusBuilding, Self::Failed],
            Self::Debating => vec![Self::ConsensusBuilding, Self::Failed],
            Self::ConsensusBuilding => vec![Self::Voting, Self::Failed],
            Self::Voting => vec![Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two contrasting proposals with a generated talking point. Presentation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debate {
    pub first_worker_id: String,
    pub second_worker_id: String,
    pub talking_point: String,
    /// True when the pair was chosen for contrasting personas rather than by position.
    pub contrasting: bool,
}

/// A recurring idea clustered from proposals by keyword overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub label: String,
    pub supporting_worker_ids: Vec<String>,
    pub raw_score: u32,
    /// `raw_score / proposal_count`, clamped to `[0, 1]`.
    pub confidence: f64,
}

/// The session's synthesized recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub approach: String,
    pub supporting_worker_ids: Vec<String>,
    pub confidence: f64,
    pub alternative_approaches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteWinner {
    pub worker_id: String,
    pub worker_name: String,
    pub vote_count: u32,
    /// Share of all votes cast, rounded to one decimal place.
    pub percentage: f64,
}

/// Per-worker vote counts keyed by worker display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub votes_by_worker: BTreeMap<String, u32>,
    pub winner: VoteWinner,
}

impl VoteTally {
    pub fn total_votes(&self) -> u32 {
        self.votes_by_worker.values().sum()
    }
}

/// Everything a completed collaboration session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub proposals: Vec<Proposal>,
    pub debates: Vec<Debate>,
    pub themes: Vec<ThemeSummary>,
    pub consensus: Consensus,
    pub tally: VoteTally,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SessionOutcome {
    pub fn successful_proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter().filter(|p| p.is_success())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }

    /// The proposal belonging to the vote winner.
    pub fn winning_proposal(&self) -> Option<&Proposal> {
        self.successful_proposals()
            .find(|p| p.worker_id == self.tally.winner.worker_id)
    }
}

/// Compact theme record kept on the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSummary {
    pub label: String,
    pub raw_score: u32,
    pub confidence: f64,
}

impl From<&Theme> for ThemeSummary {
    fn from(theme: &Theme) -> Self {
        Self {
            label: theme.label.clone(),
            raw_score: theme.raw_score,
            confidence: theme.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        assert!(SessionPhase::Created.can_transition_to(SessionPhase::GatheringProposals));
        assert!(SessionPhase::GatheringProposals.can_transition_to(SessionPhase::ConsensusBuilding));
        assert!(SessionPhase::GatheringProposals.can_transition_to(SessionPhase::Debating));
        assert!(!SessionPhase::Voting.can_transition_to(SessionPhase::Debating));
        assert!(SessionPhase::Voting.can_transition_to(SessionPhase::Failed));
        assert!(SessionPhase::Completed.valid_transitions().is_empty());
    }

    #[test]
    fn test_tally_total() {
        let mut votes = BTreeMap::new();
        votes.insert("Ada".to_string(), 1);
        votes.insert("Bo".to_string(), 2);
        let tally = VoteTally {
            votes_by_worker: votes,
            winner: VoteWinner {
                worker_id: "w2".to_string(),
                worker_name: "Bo".to_string(),
                vote_count: 2,
                percentage: 66.7,
            },
        };
        assert_eq!(tally.total_votes(), 3);
    }
}
