//! Artifact persistence port.

use async_trait::async_trait;

use crate::domain::errors::PipelineResult;
use crate::domain::models::{Artifact, ArtifactRecord};

/// Persists final artifacts.
///
/// Persistence is best-effort: the orchestrator logs and swallows errors.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store an artifact, returning a record when the store keeps one.
    async fn save_artifact(&self, artifact: &Artifact) -> PipelineResult<Option<ArtifactRecord>>;
}
