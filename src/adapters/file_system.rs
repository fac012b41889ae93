use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::ports::file_system::{FileSystem, FileSystemError, FileSystemResult};

/// File system adapter reading fragment files with tokio.
///
/// When a root is configured, relative fragment paths are resolved against it
/// and every path must stay inside it after canonicalisation.
#[derive(Debug, Default, Clone)]
pub struct FileSystemAdapter {
    root: Option<PathBuf>,
}

impl FileSystemAdapter {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    async fn resolve(&self, path: &Path) -> FileSystemResult<PathBuf> {
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };
        let full_path = root.join(path);

        // Security check: ensure the resolved path is still within root
        let canonical_root = tokio::fs::canonicalize(root)
            .await
            .map_err(|source| FileSystemError::Io {
                path: root.clone(),
                source,
            })?;
        let canonical_path =
            tokio::fs::canonicalize(&full_path)
                .await
                .map_err(|source| FileSystemError::Io {
                    path: full_path.clone(),
                    source,
                })?;

        if !canonical_path.starts_with(&canonical_root) {
            return Err(FileSystemError::InvalidPath(format!(
                "{} escapes the fragment root",
                path.display()
            )));
        }
        Ok(canonical_path)
    }
}

#[async_trait]
impl FileSystem for FileSystemAdapter {
    async fn read_to_string(&self, path: &Path) -> FileSystemResult<String> {
        let full_path = self.resolve(path).await?;
        tracing::debug!(path = %full_path.display(), "reading file fragment");

        let bytes = tokio::fs::read(&full_path)
            .await
            .map_err(|source| FileSystemError::Io {
                path: full_path.clone(),
                source,
            })?;
        String::from_utf8(bytes).map_err(|_| FileSystemError::InvalidUtf8(full_path))
    }
}
