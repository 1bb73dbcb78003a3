// Artifact stores: where a report file is looked up

use crate::executor::RemoteExecutor;
use crate::executor::remote::quote_arg;
use crate::retriever::{Result, RetrievalError};
use crate::settings::RemoteTarget;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Filesystem view the retriever reads reports through
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether a regular file exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    async fn read_to_string(&self, path: &Path) -> Result<String>;

    /// File names (not paths) directly inside `dir`
    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;
}

/// This machine's filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalArtifactStore;

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn exists(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RetrievalError::Store(format!("{}: {}", path.display(), e)))
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| RetrievalError::Store(format!("{}: {}", dir.display(), e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

/// A remote host's filesystem, read in place over ssh
#[derive(Debug, Clone)]
pub struct RemoteArtifactStore {
    executor: RemoteExecutor,
    target: RemoteTarget,
}

impl RemoteArtifactStore {
    pub fn new(executor: RemoteExecutor, target: RemoteTarget) -> Self {
        Self { executor, target }
    }

    async fn shell(&self, command_line: String) -> Result<String> {
        let result = self
            .executor
            .run(&command_line, &self.target)
            .await
            .and_then(|r| r.into_checked())
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        Ok(result.stdout)
    }
}

fn remote_path(path: &Path) -> String {
    quote_arg(&path.to_string_lossy())
}

#[async_trait]
impl ArtifactStore for RemoteArtifactStore {
    async fn exists(&self, path: &Path) -> bool {
        let command = format!(
            "test -f {} && echo \"EXISTS\" || echo \"NOT_FOUND\"",
            remote_path(path)
        );
        match self.shell(command).await {
            Ok(stdout) => stdout.lines().any(|line| line.trim() == "EXISTS"),
            Err(e) => {
                debug!(error = %e, "remote existence check failed");
                false
            }
        }
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        self.shell(format!("cat {}", remote_path(path))).await
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let stdout = self.shell(format!("ls -1 {}", remote_path(dir))).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
