//! Page rows.

use serde::{Deserialize, Serialize};

use crate::{Row, SqlValue, StoreError, StoreErrorKind};

/// Column list used by every page query, in [`Page::from_row`] order.
pub const PAGE_COLUMNS: &str = "path, slug, title, content, template, data, published_date";

/// A row of the `pages` table.
///
/// `data` holds the page's merged metadata (front matter over inherited
/// directory metadata). It is stored as a serialized JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Source-relative path without extension (e.g., "blog/post").
    pub path: String,
    /// URL slug derived from the path.
    pub slug: String,
    /// Page title.
    pub title: String,
    /// Render-ready body (HTML for markdown sources).
    pub content: String,
    /// Name of the template asset to render with.
    pub template: String,
    /// Merged metadata.
    pub data: serde_json::Map<String, serde_json::Value>,
    /// ISO date used for ordering.
    pub published_date: Option<String>,
}

impl Page {
    /// Build a page from a row selected with [`PAGE_COLUMNS`].
    ///
    /// A `data` column that is not a JSON object degrades to an empty map
    /// with a warning; it never fails the whole row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::Serialization`] if `path` is missing.
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        let path = row
            .text("path")
            .ok_or_else(|| StoreError::new(StoreErrorKind::Serialization))?
            .to_owned();

        let data = match row.text("data") {
            Some(raw) => parse_data(&path, raw),
            None => serde_json::Map::new(),
        };

        Ok(Self {
            slug: row.text("slug").map_or_else(|| slugify(&path), str::to_owned),
            title: row.text("title").unwrap_or_default().to_owned(),
            content: row.text("content").unwrap_or_default().to_owned(),
            template: row.text("template").unwrap_or_default().to_owned(),
            published_date: row.text("published_date").map(str::to_owned),
            data,
            path,
        })
    }

    /// Bind parameters in [`PAGE_COLUMNS`] order.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `data` cannot be encoded.
    pub fn to_params(&self) -> Result<Vec<SqlValue>, StoreError> {
        let data = serde_json::to_string(&self.data).map_err(StoreError::serialization)?;
        Ok(vec![
            SqlValue::Text(self.path.clone()),
            SqlValue::Text(self.slug.clone()),
            SqlValue::Text(self.title.clone()),
            SqlValue::Text(self.content.clone()),
            SqlValue::Text(self.template.clone()),
            SqlValue::Text(data),
            self.published_date
                .clone()
                .map_or(SqlValue::Null, SqlValue::Text),
        ])
    }

    /// Metadata value by key.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Metadata string value by key.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

fn parse_data(path: &str, raw: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => {
            tracing::warn!(path = %path, "Page metadata is not an object, using empty metadata");
            serde_json::Map::new()
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Malformed page metadata, using empty metadata");
            serde_json::Map::new()
        }
    }
}

/// Derive a URL slug from a page path.
///
/// Lowercases each segment and collapses whitespace runs into `-`.
///
/// # Examples
///
/// ```
/// use bake_store::slugify;
///
/// assert_eq!(slugify("Blog/My First Post"), "blog/my-first-post");
/// ```
#[must_use]
pub fn slugify(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            segment
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-")
                .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Characters rejected in page paths.
const PAGE_PATH_FORBIDDEN: [char; 4] = ['<', '>', '"', '\''];

/// Validate and normalize a page path.
///
/// Returns `None` for empty paths, paths with `..` and paths containing any
/// of `< > " '`. A leading `/` is stripped.
#[must_use]
pub fn validate_page_path(path: &str) -> Option<&str> {
    let trimmed = path.trim();
    if trimmed.is_empty()
        || trimmed.contains("..")
        || trimmed.contains(PAGE_PATH_FORBIDDEN)
        || trimmed.contains('\0')
    {
        return None;
    }
    let stripped = trimmed.trim_start_matches('/');
    (!stripped.is_empty()).then_some(stripped)
}
