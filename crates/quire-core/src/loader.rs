//! Collaborator seams: content loading and entry rendering

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{GraphError, Result};
use crate::model::NodeKey;

/// Read-only access to project content, keyed by normalized relative path.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Read a file's content. `GraphError::NotFound` when the file is absent.
    async fn read(&self, path: &NodeKey) -> Result<String>;

    async fn exists(&self, path: &NodeKey) -> bool;
}

/// Loader over a project root on the local filesystem.
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FsLoader {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn absolute(&self, path: &NodeKey) -> PathBuf {
        self.root.join(path.file_part())
    }
}

#[async_trait]
impl Loader for FsLoader {
    async fn read(&self, path: &NodeKey) -> Result<String> {
        match tokio::fs::read_to_string(self.absolute(path)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GraphError::NotFound(path.clone()))
            }
            Err(e) => Err(GraphError::Io(e)),
        }
    }

    async fn exists(&self, path: &NodeKey) -> bool {
        tokio::fs::try_exists(self.absolute(path))
            .await
            .unwrap_or(false)
    }
}

/// Produces output for one invalidated entry or TOC. Rendering failures are
/// logged per item by the caller, never fatal to a batch.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, entry: &NodeKey, content: &str) -> anyhow::Result<()>;
}
