use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Error type for file system operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileSystemError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error when path is invalid or escapes the configured root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{} is not valid UTF-8", .0.display())]
    InvalidUtf8(PathBuf),
}

/// Result type for file system operations
pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// FileSystem defines the port (interface) for reading file fragments.
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Read a whole file as UTF-8 text.
    async fn read_to_string(&self, path: &Path) -> FileSystemResult<String>;
}
