//! Deployment port.

use async_trait::async_trait;

use crate::domain::errors::PipelineResult;
use crate::domain::models::{Artifact, TaskDescriptor};

/// Publishes a final artifact and reports where it landed.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploy the artifact, returning its location.
    async fn deploy(&self, artifact: &Artifact, task: &TaskDescriptor) -> PipelineResult<String>;
}
