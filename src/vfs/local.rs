use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{normalize_path, VfsError, VirtualFileSystem};

/// Files below a root directory on the local disk
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(normalize_path(path))
    }
}

fn map_not_found(err: std::io::Error, path: &str) -> VfsError {
    if err.kind() == ErrorKind::NotFound {
        VfsError::NotFound(path.to_string())
    } else {
        VfsError::IoError(err)
    }
}

impl VirtualFileSystem for LocalFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| map_not_found(e, path))
    }

    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<(), VfsError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        log::debug!("Wrote {} ({})", path, target.display());
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, VfsError> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn delete_file(&self, path: &str) -> Result<(), VfsError> {
        tokio::fs::remove_file(self.resolve(path))
            .await
            .map_err(|e| map_not_found(e, path))
    }
}
