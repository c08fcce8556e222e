//! The render facade.

use std::fmt;
use std::sync::Arc;

use bake_store::{
    Asset, AssetKind, ContentStore, PAGE_COLUMNS, Page, Row, SITE_META_PATH, SqlValue,
    StoreError,
};

use crate::error_page::render_error_page;
use crate::template::{CompiledTemplate, FilterTable};
use crate::validate::{normalize_asset_name, validate_page_path};
use crate::{RenderError, ValidationError};

/// Default page count of listing queries.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Execution environment of a [`Baker`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Host {
    /// Batch build producing static files.
    #[default]
    Build,
    /// Worker runtime serving pages on demand.
    Browser,
}

impl Host {
    /// Whether error pages include the failure detail.
    #[must_use]
    pub fn shows_error_detail(self) -> bool {
        matches!(self, Host::Build)
    }
}

/// Configuration for [`Baker`].
#[derive(Clone, Debug, Default)]
pub struct BakerConfig {
    /// Execution environment.
    pub host: Host,
    /// Filters available to templates.
    pub filters: FilterTable,
}

impl BakerConfig {
    /// Config for `host` with the standard filters.
    #[must_use]
    pub fn new(host: Host) -> Self {
        Self {
            host,
            filters: FilterTable::standard(),
        }
    }

    /// Replace the filter table.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterTable) -> Self {
        self.filters = filters;
        self
    }
}

/// Processed asset returned by [`Baker::get_asset`].
#[derive(Debug)]
pub enum AssetValue {
    /// Content passed through unchanged.
    Raw(Vec<u8>),
    /// Deserialized structured data.
    Data(serde_json::Value),
    /// Compiled template.
    Template(CompiledTemplate),
}

/// Query and render facade over a [`ContentStore`].
///
/// The only component that touches the store. Cloning is cheap; clones
/// share the store.
#[derive(Clone)]
pub struct Baker {
    inner: Arc<BakerInner>,
}

struct BakerInner {
    store: ContentStore,
    config: BakerConfig,
}

impl Baker {
    /// Create a Baker owning `store`.
    #[must_use]
    pub fn new(store: ContentStore, config: BakerConfig) -> Self {
        Self {
            inner: Arc::new(BakerInner { store, config }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BakerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn host(&self) -> Host {
        self.inner.config.host
    }

    /// Look up an asset by normalized name.
    ///
    /// Not-found is `Ok(None)`; the asset inventory of `kind` is logged at
    /// debug level. Store failures are logged and treated as not found.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for names that fail normalization; the
    /// store is not queried.
    pub fn get_raw_asset(
        &self,
        name: &str,
        kind: AssetKind,
    ) -> Result<Option<Asset>, ValidationError> {
        let path = normalize_asset_name(name, kind)?;
        match self.inner.store.asset(&path, kind) {
            Ok(Some(asset)) => Ok(Some(asset)),
            Ok(None) => {
                self.log_inventory(&path, kind);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(path = %path, kind = %kind, error = %e, "Asset lookup failed");
                Ok(None)
            }
        }
    }

    fn log_inventory(&self, path: &str, kind: AssetKind) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let available = self.inner.store.asset_paths(kind).unwrap_or_default();
        tracing::debug!(path = %path, kind = %kind, ?available, "Asset not found");
    }

    /// Look up an asset and process it according to its kind.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names, undecodable data assets and
    /// templates that fail to parse.
    pub fn get_asset(
        &self,
        name: &str,
        kind: AssetKind,
    ) -> Result<Option<AssetValue>, RenderError> {
        let Some(asset) = self.get_raw_asset(name, kind)? else {
            return Ok(None);
        };

        let value = match asset.kind {
            AssetKind::Image | AssetKind::Script | AssetKind::Other => {
                AssetValue::Raw(asset.content)
            }
            AssetKind::Data => AssetValue::Data(parse_data(&asset)?),
            AssetKind::Template => {
                let source = asset.text().into_owned();
                AssetValue::Template(CompiledTemplate::compile(self, &asset.path, source)?)
            }
            AssetKind::Stylesheet => {
                tracing::warn!(
                    path = %asset.path,
                    kind = %asset.kind,
                    "No processor registered for asset type, returning raw content"
                );
                AssetValue::Raw(asset.content)
            }
        };
        Ok(Some(value))
    }

    /// Fetch a page by path.
    ///
    /// Returns `None` for invalid paths (empty, `..`, `< > " '`) without
    /// querying the store, and for missing pages.
    #[must_use]
    pub fn get_page(&self, path: &str) -> Option<Page> {
        let path = validate_page_path(path)?;
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE path = ?1");
        match self
            .inner
            .store
            .fetch_one(&sql, &[SqlValue::Text(path.to_owned())])
        {
            Ok(row) => row.and_then(|row| to_page(&row)),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Page lookup failed");
                None
            }
        }
    }

    /// Every page path, sorted.
    ///
    /// # Errors
    ///
    /// Returns the store error if the query fails.
    pub fn page_paths(&self) -> Result<Vec<String>, StoreError> {
        let rows = self
            .inner
            .store
            .fetch_all("SELECT path FROM pages ORDER BY path", &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.text("path").map(str::to_owned))
            .collect())
    }

    /// Render `page` with its template, falling back to an error page.
    #[must_use]
    pub fn render_page(&self, page: &Page) -> String {
        match self.try_render_page(page) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(path = %page.path, error = %e, "Failed to render page");
                render_error_page(self.host(), &e.to_string())
            }
        }
    }

    /// Render `page` with its template.
    ///
    /// The template is `data.template` if set, else `page.template`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TemplateNotFound`] if the template is missing,
    /// or any error raised while compiling or rendering it.
    pub fn try_render_page(&self, page: &Page) -> Result<String, RenderError> {
        let name = page
            .meta_str("template")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&page.template);
        let asset = self
            .get_raw_asset(name, AssetKind::Template)?
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_owned()))?;

        let template = CompiledTemplate::compile(self, &asset.path, asset.text().into_owned())?;
        template.render(page)
    }

    /// Most recent dated pages, newest first.
    ///
    /// Pages without `published_date` are excluded. `category` filters on
    /// the `category` metadata field.
    #[must_use]
    pub fn latest_pages(&self, limit: usize, offset: usize, category: Option<&str>) -> Vec<Page> {
        let mut params = Vec::with_capacity(3);
        let mut sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE published_date IS NOT NULL");
        if let Some(category) = category {
            sql.push_str(" AND json_extract(data, '$.category') = ?");
            params.push(SqlValue::Text(category.to_owned()));
        }
        sql.push_str(" ORDER BY published_date DESC, path ASC LIMIT ? OFFSET ?");
        params.push(sql_int(limit));
        params.push(sql_int(offset));
        self.fetch_pages(&sql, &params)
    }

    /// Page with the nearest earlier `published_date`.
    #[must_use]
    pub fn prev_page(&self, page: &Page) -> Option<Page> {
        self.neighbour(page, "<", "DESC")
    }

    /// Page with the nearest later `published_date`.
    #[must_use]
    pub fn next_page(&self, page: &Page) -> Option<Page> {
        self.neighbour(page, ">", "ASC")
    }

    fn neighbour(&self, page: &Page, op: &str, order: &str) -> Option<Page> {
        let date = page.published_date.as_deref()?;
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages \
             WHERE published_date IS NOT NULL AND published_date {op} ?1 \
             ORDER BY published_date {order}, path {order} LIMIT 1"
        );
        self.fetch_pages(&sql, &[SqlValue::Text(date.to_owned())])
            .into_iter()
            .next()
    }

    /// Case-insensitive substring search over title and content.
    ///
    /// Results are ordered newest first; an empty query matches nothing.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize, offset: usize) -> Vec<Page> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let pattern = SqlValue::Text(format!("%{}%", escape_like(query)));
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages \
             WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\' \
             ORDER BY published_date DESC, path ASC LIMIT ?2 OFFSET ?3"
        );
        self.fetch_pages(&sql, &[pattern, sql_int(limit), sql_int(offset)])
    }

    /// Site metadata, `{}` if absent or malformed.
    #[must_use]
    pub fn site(&self) -> serde_json::Value {
        let empty = || serde_json::Value::Object(serde_json::Map::new());
        let Ok(Some(asset)) = self.get_raw_asset(SITE_META_PATH, AssetKind::Data) else {
            return empty();
        };
        match serde_json::from_slice::<serde_json::Value>(&asset.content) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            Ok(_) => {
                tracing::warn!("Site metadata is not an object, using empty metadata");
                empty()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed site metadata, using empty metadata");
                empty()
            }
        }
    }

    /// Raw SQL passthrough for trusted callers.
    ///
    /// Not reachable from templates.
    ///
    /// # Errors
    ///
    /// Returns the store error if the statement fails.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.inner.store.fetch_all(sql, params)
    }

    fn fetch_pages(&self, sql: &str, params: &[SqlValue]) -> Vec<Page> {
        match self.inner.store.fetch_all(sql, params) {
            Ok(rows) => rows.iter().filter_map(to_page).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Page query failed");
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for Baker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Baker")
            .field("host", &self.inner.config.host)
            .field("driver", &self.inner.store.driver_kind())
            .finish_non_exhaustive()
    }
}

fn to_page(row: &Row) -> Option<Page> {
    Page::from_row(row)
        .inspect_err(|e| tracing::warn!(error = %e, "Skipping malformed page row"))
        .ok()
}

fn sql_int(n: usize) -> SqlValue {
    SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Escape `LIKE` wildcards with `\`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn parse_data(asset: &Asset) -> Result<serde_json::Value, RenderError> {
    let data_error = |message: String| RenderError::Data {
        path: asset.path.clone(),
        message,
    };
    let is_yaml = asset.path.ends_with(".yaml") || asset.path.ends_with(".yml");
    if is_yaml {
        serde_yaml::from_slice(&asset.content).map_err(|e| data_error(e.to_string()))
    } else {
        serde_json::from_slice(&asset.content).map_err(|e| data_error(e.to_string()))
    }
}
