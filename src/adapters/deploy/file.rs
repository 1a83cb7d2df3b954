//! File-system deployer.
//!
//! Writes the artifact payload under an output directory and reports a
//! `file://` URL.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{Artifact, TaskDescriptor};
use crate::domain::ports::Deployer;

#[derive(Debug, Clone)]
pub struct FileDeployer {
    output_dir: PathBuf,
}

impl FileDeployer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<kind>-<scope>-<worker>.txt`, keeping only filename-safe characters.
    fn file_name(artifact: &Artifact, task: &TaskDescriptor) -> String {
        let mut parts = vec![artifact.kind.as_str()];
        if let Some(scope) = task.target_scope.as_deref() {
            parts.push(scope);
        }
        parts.push(artifact.source_worker.as_str());

        let stem: String = parts
            .join("-")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{stem}.txt")
    }
}

#[async_trait]
impl Deployer for FileDeployer {
    async fn deploy(&self, artifact: &Artifact, task: &TaskDescriptor) -> PipelineResult<String> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                PipelineError::DeploymentFailure(format!(
                    "cannot create {}: {e}",
                    self.output_dir.display()
                ))
            })?;

        let path = self.output_dir.join(Self::file_name(artifact, task));
        tokio::fs::write(&path, artifact.payload.as_bytes())
            .await
            .map_err(|e| {
                PipelineError::DeploymentFailure(format!("cannot write {}: {e}", path.display()))
            })?;

        let absolute = tokio::fs::canonicalize(&path).await.unwrap_or(path);
        tracing::info!(path = %absolute.display(), "Artifact deployed");
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn artifact() -> Artifact {
        Artifact {
            kind: "component".to_string(),
            source_worker: "w1".to_string(),
            payload: "<button/>".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_deploy_writes_file() {
        let dir = TempDir::new().unwrap();
        let deployer = FileDeployer::new(dir.path().join("out"));
        let task = TaskDescriptor::new("create", "component").with_scope("Nav Bar");

        let url = deployer.deploy(&artifact(), &task).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("component-nav_bar-w1.txt"));

        let written = std::fs::read_to_string(url.trim_start_matches("file://")).unwrap();
        assert_eq!(written, "<button/>");
    }

    #[tokio::test]
    async fn test_deploy_into_file_path_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let deployer = FileDeployer::new(&blocker);
        let err = deployer
            .deploy(&artifact(), &TaskDescriptor::new("create", "component"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DeploymentFailure(_)));
    }
}
