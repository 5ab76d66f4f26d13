pub mod local;
pub mod memory;

use std::future::Future;

use thiserror::Error;

pub use local::LocalFs;
pub use memory::MemoryFs;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Storage backend for profile documents, proxy lists, plugin code and the
/// generated kernel configuration. Paths are relative, `/`-separated.
pub trait VirtualFileSystem {
    fn read_file(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, VfsError>>;
    fn write_file(
        &self,
        path: &str,
        content: Vec<u8>,
    ) -> impl Future<Output = Result<(), VfsError>>;
    fn exists(&self, path: &str) -> impl Future<Output = Result<bool, VfsError>>;
    fn delete_file(&self, path: &str) -> impl Future<Output = Result<(), VfsError>>;

    fn read_text(&self, path: &str) -> impl Future<Output = Result<String, VfsError>> {
        async move {
            let bytes = self.read_file(path).await?;
            String::from_utf8(bytes).map_err(|_| VfsError::InvalidUtf8(path.to_string()))
        }
    }
}

/// Normalize path: strip leading `./` and `/` so both backends agree on keys
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_start_matches("./");
    trimmed.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/data/a.json"), "data/a.json");
        assert_eq!(normalize_path("./data/a.json"), "data/a.json");
        assert_eq!(normalize_path("data/a.json"), "data/a.json");
    }
}
