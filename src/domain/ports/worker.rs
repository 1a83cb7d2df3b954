//! Worker port - interface for text-generation backends.

use async_trait::async_trait;

use crate::domain::errors::WorkerError;
use crate::domain::models::WorkerHandle;

/// A single external text-generation worker.
///
/// Implementations may fail or hang; timeouts are enforced by the caller
/// (`WorkerClient`), never trusted to the worker.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Reference data for this worker.
    fn handle(&self) -> &WorkerHandle;

    /// Generate a response for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, WorkerError>;
}
