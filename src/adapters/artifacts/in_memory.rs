//! In-memory artifact store.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::PipelineResult;
use crate::domain::models::{Artifact, ArtifactRecord};
use crate::domain::ports::ArtifactStore;

/// Keeps every saved artifact in process memory.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<Vec<(ArtifactRecord, Artifact)>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<Artifact> {
        self.artifacts
            .read()
            .await
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(_, artifact)| artifact.clone())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save_artifact(&self, artifact: &Artifact) -> PipelineResult<Option<ArtifactRecord>> {
        let record = ArtifactRecord {
            id: Uuid::new_v4().to_string(),
            stored_at: Utc::now(),
        };
        self.artifacts
            .write()
            .await
            .push((record.clone(), artifact.clone()));
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemoryArtifactStore::new();
        let artifact = Artifact {
            kind: "component".to_string(),
            source_worker: "w1".to_string(),
            payload: "<button/>".to_string(),
            metadata: BTreeMap::new(),
        };

        let record = store.save_artifact(&artifact).await.unwrap().unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&record.id).await, Some(artifact));
        assert!(store.get("missing").await.is_none());
    }
}
