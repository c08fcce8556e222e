//! Store error type.
//!
//! [`StoreError`] carries a semantic [`StoreErrorKind`] plus optional path
//! context and the underlying driver error.

use std::path::PathBuf;

/// Semantic error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// Row or database file does not exist.
    NotFound,
    /// Row with the same key already exists.
    AlreadyExists,
    /// Invalid path or identifier.
    InvalidPath,
    /// SQLite reported an error.
    Database,
    /// Stored value could not be (de)serialized.
    Serialization,
    /// Filesystem error around the database file.
    Io,
}

/// Store error with semantic kind and driver-specific source.
#[derive(Debug)]
pub struct StoreError {
    /// Semantic error category.
    pub kind: StoreErrorKind,
    /// Path context (database file or row path).
    pub path: Option<PathBuf>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            kind,
            path: None,
            source: None,
        }
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create an I/O error for a database file.
    #[must_use]
    pub fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            _ => StoreErrorKind::Io,
        };
        Self::new(kind).with_source(err).with_path(path)
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(err: serde_json::Error) -> Self {
        Self::new(StoreErrorKind::Serialization).with_source(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let kind = match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => StoreErrorKind::AlreadyExists,
            Some(rusqlite::ErrorCode::CannotOpen) => StoreErrorKind::NotFound,
            _ => StoreErrorKind::Database,
        };
        Self::new(kind).with_source(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "Kind: message (path: foo/bar)"
        let kind_str = match self.kind {
            StoreErrorKind::NotFound => "Not found",
            StoreErrorKind::AlreadyExists => "Already exists",
            StoreErrorKind::InvalidPath => "Invalid path",
            StoreErrorKind::Database => "Database error",
            StoreErrorKind::Serialization => "Serialization error",
            StoreErrorKind::Io => "I/O error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }

        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}
