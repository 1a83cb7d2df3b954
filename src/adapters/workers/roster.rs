//! Worker roster.
//!
//! Holds every configured worker and answers the two questions the pipeline
//! asks: who is available, and who serves a given artifact kind.

use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::models::{Persona, WorkerConfig, WorkerHandle, WorkerKind};
use crate::domain::ports::Worker;

use super::http::HttpWorker;
use super::scripted::ScriptedWorker;

/// Registry of callable workers, in configuration order.
#[derive(Clone, Default)]
pub struct WorkerRoster {
    workers: Vec<Arc<dyn Worker>>,
}

impl WorkerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from worker configuration.
    ///
    /// Disabled entries are skipped. Http entries without an endpoint are
    /// skipped with a warning; config validation normally rejects them first.
    pub fn from_config(configs: &[WorkerConfig]) -> Self {
        let client = Client::new();
        let mut roster = Self::new();

        for config in configs.iter().filter(|c| c.enabled) {
            let persona = config
                .persona
                .as_deref()
                .map(Persona::normalize)
                .unwrap_or_default();
            let name = config.name.clone().unwrap_or_else(|| config.id.clone());
            let mut handle = WorkerHandle::new(config.id.clone(), name, persona);
            if let Some(domain) = &config.domain {
                handle = handle.with_domain(domain.clone());
            }

            match config.kind {
                WorkerKind::Echo => roster.register(Arc::new(ScriptedWorker::echo(handle))),
                WorkerKind::Http => {
                    let Some(endpoint) = config.endpoint.as_deref() else {
                        tracing::warn!(worker_id = %config.id, "Http worker has no endpoint, skipping");
                        continue;
                    };
                    let mut worker = HttpWorker::new(handle, endpoint, client.clone());
                    if let Some(model) = &config.model {
                        worker = worker.with_model(model.clone());
                    }
                    roster.register(Arc::new(worker));
                }
            }
        }

        tracing::debug!(workers = roster.len(), "Worker roster built");
        roster
    }

    /// Add a worker. A worker with an id already present replaces it in place.
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        let id = worker.handle().id.clone();
        if let Some(slot) = self.workers.iter_mut().find(|w| w.handle().id == id) {
            *slot = worker;
        } else {
            self.workers.push(worker);
        }
    }

    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.register(worker);
        self
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Worker>> {
        self.workers.iter().find(|w| w.handle().id == id).cloned()
    }

    /// Every worker marked available.
    pub fn available(&self) -> Vec<Arc<dyn Worker>> {
        self.workers
            .iter()
            .filter(|w| w.handle().available)
            .cloned()
            .collect()
    }

    /// Available workers bound to the artifact kind, or every available
    /// worker when none are bound to it.
    pub fn for_domain(&self, artifact_kind: &str) -> Vec<Arc<dyn Worker>> {
        let available = self.available();
        let bound: Vec<_> = available
            .iter()
            .filter(|w| w.handle().serves(artifact_kind))
            .cloned()
            .collect();
        if bound.is_empty() {
            available
        } else {
            bound
        }
    }

    /// Handles of every registered worker.
    pub fn handles(&self) -> Vec<WorkerHandle> {
        self.workers.iter().map(|w| w.handle().clone()).collect()
    }

    /// Distinct personas among available workers.
    pub fn personas(&self) -> HashSet<Persona> {
        self.available().iter().map(|w| w.handle().persona).collect()
    }
}

impl std::fmt::Debug for WorkerRoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRoster")
            .field(
                "workers",
                &self.workers.iter().map(|w| w.handle().id.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
