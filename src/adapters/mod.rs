//! Adapters implementing the domain ports.

pub mod artifacts;
pub mod deploy;
pub mod workers;

pub use artifacts::InMemoryArtifactStore;
pub use deploy::FileDeployer;
pub use workers::{ConcurrencyTracker, HttpWorker, ScriptedWorker, WorkerRoster};
