//! Name normalization and validation.
//!
//! Every asset name and page path coming from a caller or a template passes
//! through here before the store is queried.

pub use bake_store::validate_page_path;
use bake_store::AssetKind;

use crate::ValidationError;

/// Default extension appended to template names without one.
pub const TEMPLATE_EXTENSION: &str = "html";

/// Normalize an asset name for lookup.
///
/// Strips leading `/`, strips a redundant `<kind>/` prefix and appends
/// `.html` to template names without an extension.
///
/// # Errors
///
/// Rejects empty names, `..` segments, NUL bytes and backslashes.
///
/// # Examples
///
/// ```
/// use bake_site::normalize_asset_name;
/// pub use bake_store::validate_page_path;
/// use bake_store::AssetKind;
///
/// assert_eq!(
///     normalize_asset_name("/templates/base", AssetKind::Template).unwrap(),
///     "base.html"
/// );
/// assert!(normalize_asset_name("../secret", AssetKind::Data).is_err());
/// ```
pub fn normalize_asset_name(name: &str, kind: AssetKind) -> Result<String, ValidationError> {
    if let Some(c) = name.chars().find(|c| *c == '\0' || *c == '\\') {
        return Err(ValidationError::InvalidCharacter(name.to_owned(), c));
    }
    if has_traversal(name) {
        return Err(ValidationError::Traversal(name.to_owned()));
    }

    let trimmed = name.trim().trim_start_matches('/');
    let stripped = trimmed
        .strip_prefix(kind.tag())
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(trimmed);
    if stripped.is_empty() || stripped.ends_with('/') {
        return Err(ValidationError::Empty);
    }

    let file_name = stripped.rsplit('/').next().unwrap_or(stripped);
    if kind == AssetKind::Template && !file_name.contains('.') {
        return Ok(format!("{stripped}.{TEMPLATE_EXTENSION}"));
    }
    Ok(stripped.to_owned())
}

/// Path with everything but `[A-Za-z0-9/_.-]` removed.
pub(crate) fn sanitize_path(path: &str) -> String {
    path.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-'))
        .collect()
}

fn has_traversal(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment.trim() == "..")
}
