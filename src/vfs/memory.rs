use std::collections::HashMap;
use std::sync::RwLock;

use super::{normalize_path, VfsError, VirtualFileSystem};

/// Process-local storage, handy for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a text file
    pub fn with_file(self, path: &str, content: impl Into<String>) -> Self {
        if let Ok(mut files) = self.files.write() {
            files.insert(normalize_path(path), content.into().into_bytes());
        }
        self
    }

    fn lock_error() -> VfsError {
        VfsError::StorageError("memory store lock poisoned".to_string())
    }
}

impl VirtualFileSystem for MemoryFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let files = self.files.read().map_err(|_| Self::lock_error())?;
        files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<(), VfsError> {
        let mut files = self.files.write().map_err(|_| Self::lock_error())?;
        files.insert(normalize_path(path), content);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, VfsError> {
        let files = self.files.read().map_err(|_| Self::lock_error())?;
        Ok(files.contains_key(&normalize_path(path)))
    }

    async fn delete_file(&self, path: &str) -> Result<(), VfsError> {
        let mut files = self.files.write().map_err(|_| Self::lock_error())?;
        files
            .remove(&normalize_path(path))
            .map(|_| ())
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fs() {
        let fs = MemoryFs::new().with_file("data/a.txt", "hello");
        assert_eq!(fs.read_text("/data/a.txt").await.unwrap(), "hello");
        assert!(fs.exists("data/a.txt").await.unwrap());
        fs.delete_file("data/a.txt").await.unwrap();
        assert!(!fs.exists("data/a.txt").await.unwrap());
        assert!(matches!(
            fs.delete_file("data/a.txt").await,
            Err(VfsError::NotFound(_))
        ));
    }
}
