//! Loader errors.

use std::path::PathBuf;

use bake_store::StoreError;

use crate::metadata::MetadataError;

/// Error that aborts a whole load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Content root does not exist or is not a directory.
    #[error("Content directory not found: {}", .0.display())]
    ContentDirNotFound(PathBuf),
    /// Store error outside of per-file processing (e.g., transaction control).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error processing a single file; recorded and skipped.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File is not valid UTF-8")]
    NotUtf8,
    #[error("invalid page path")]
    InvalidPagePath,
    #[error("Invalid front matter: {0}")]
    FrontMatter(#[from] MetadataError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
