//! Directory and front matter metadata.
//!
//! Metadata is a free-form mapping. Each directory may carry one metadata
//! file; its keys override the keys inherited from the parent directory and
//! the merged mapping is passed down to subdirectories and files.

use serde_json::Value;

/// Free-form metadata mapping.
pub type Metadata = serde_json::Map<String, Value>;

/// Error type for metadata parsing.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// YAML parsing error.
    #[error("Invalid YAML: {0}")]
    Parse(String),
    /// Document parsed but is not a mapping.
    #[error("Metadata must be a mapping, found {0}")]
    NotAMapping(&'static str),
}

/// Parse metadata from YAML content.
///
/// Empty content yields an empty mapping.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or its top level is not a mapping.
pub fn parse_metadata(content: &str) -> Result<Metadata, MetadataError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Metadata::new());
    }

    let value: Value =
        serde_yaml::from_str(trimmed).map_err(|e| MetadataError::Parse(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        Value::Bool(_) => Err(MetadataError::NotAMapping("a boolean")),
        Value::Number(_) => Err(MetadataError::NotAMapping("a number")),
        Value::String(_) => Err(MetadataError::NotAMapping("a string")),
        Value::Array(_) => Err(MetadataError::NotAMapping("a sequence")),
    }
}

/// Merge child metadata over parent metadata.
///
/// The merge is shallow: a child key replaces the parent's value for that
/// key wholesale.
#[must_use]
pub fn merge_metadata(parent: &Metadata, child: &Metadata) -> Metadata {
    let mut merged = parent.clone();
    for (key, value) in child {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Whether merged metadata marks the page as a draft.
#[must_use]
pub fn is_draft(meta: &Metadata) -> bool {
    matches!(meta.get("draft"), Some(Value::Bool(true)))
}
