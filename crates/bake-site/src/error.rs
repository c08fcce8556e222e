//! Error types for lookups and rendering.

use bake_store::StoreError;

/// A path or asset name was rejected before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Name is empty after normalization.
    #[error("Empty name")]
    Empty,
    /// Name contains a `..` segment.
    #[error("Path traversal in {0:?}")]
    Traversal(String),
    /// Name contains a forbidden character.
    #[error("Invalid character {1:?} in {0:?}")]
    InvalidCharacter(String, char),
}

/// Error rendering a page or processing an asset.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Invalid asset or page name.
    #[error("Invalid name: {0}")]
    Validation(#[from] ValidationError),
    /// Page template does not exist.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
    /// A template in the extends chain does not exist.
    #[error("Parent template not found: {0}")]
    ParentNotFound(String),
    /// Template syntax or evaluation error.
    #[error("Template error: {0}")]
    Template(#[source] minijinja::Error),
    /// Data asset could not be deserialized.
    #[error("Invalid data asset {path}: {message}")]
    Data { path: String, message: String },
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
