//! Null artifact store implementation.
//!
//! Used when artifact persistence is not configured.

use async_trait::async_trait;

use super::ArtifactStore;
use crate::domain::errors::PipelineResult;
use crate::domain::models::{Artifact, ArtifactRecord};

/// An artifact store that stores nothing.
#[derive(Debug, Clone, Default)]
pub struct NullArtifactStore;

impl NullArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactStore for NullArtifactStore {
    async fn save_artifact(&self, _artifact: &Artifact) -> PipelineResult<Option<ArtifactRecord>> {
        Ok(None)
    }
}
