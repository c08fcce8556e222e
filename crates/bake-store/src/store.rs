//! The content store.
//!
//! [`ContentStore`] owns one SQLite connection, wrapped in the
//! [`StatementDriver`] chosen at construction. All access is serialized
//! through a mutex so the store can be shared behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OpenFlags};

use crate::driver::driver_for;
use crate::{
    Asset, AssetKind, DriverKind, PAGE_COLUMNS, Page, Row, SqlValue, StatementDriver, StoreError,
};

/// Schema of the content store.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS assets (
    path TEXT NOT NULL,
    type TEXT NOT NULL,
    content BLOB,
    PRIMARY KEY (path, type)
);
CREATE TABLE IF NOT EXISTS pages (
    path TEXT PRIMARY KEY,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    template TEXT NOT NULL,
    data TEXT NOT NULL,
    published_date TEXT
);
CREATE INDEX IF NOT EXISTS pages_published_date ON pages (published_date);
";

/// Relational store holding `assets` and `pages`.
pub struct ContentStore {
    driver: Mutex<Box<dyn StatementDriver>>,
    location: Option<PathBuf>,
}

impl ContentStore {
    /// Create a fresh database file at `path`, replacing any existing one.
    ///
    /// The store is always rebuilt from scratch; there are no incremental
    /// updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the old file cannot be removed or the schema
    /// cannot be created.
    pub fn create(path: &Path, kind: DriverKind) -> Result<Self, StoreError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| StoreError::io(e, path))?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(e, parent))?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::from(e).with_path(path))?;
        let store = Self::with_driver(driver_for(kind, conn), Some(path.to_path_buf()));
        store.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// Create an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory(kind: DriverKind) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self::with_driver(driver_for(kind, conn), None);
        store.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// Open an existing database file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreErrorKind::NotFound`] if the file is missing.
    pub fn open_read_only(path: &Path, kind: DriverKind) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::new(crate::StoreErrorKind::NotFound).with_path(path));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::from(e).with_path(path))?;
        Ok(Self::with_driver(
            driver_for(kind, conn),
            Some(path.to_path_buf()),
        ))
    }

    /// Wrap an already configured driver.
    #[must_use]
    pub fn with_driver(driver: Box<dyn StatementDriver>, location: Option<PathBuf>) -> Self {
        Self {
            driver: Mutex::new(driver),
            location,
        }
    }

    /// Database file backing this store (`None` for in-memory stores).
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Access convention of the underlying driver.
    pub fn driver_kind(&self) -> DriverKind {
        self.lock().kind()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn StatementDriver>> {
        // Statements never leave the driver half-applied, so a poisoned
        // guard is still consistent.
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a statement.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite rejects the statement.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError> {
        self.lock().execute(sql, params)
    }

    /// Execute a batch of statements without parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite rejects any statement.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.lock().execute_batch(sql)
    }

    /// Fetch the first matching row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        self.lock().fetch_one(sql, params)
    }

    /// Fetch all matching rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.lock().fetch_all(sql, params)
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or a store error if the transaction cannot
    /// be started or committed.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.execute_batch("BEGIN")?;
        match f(self) {
            Ok(value) => {
                self.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "Failed to roll back transaction");
                }
                Err(e)
            }
        }
    }

    /// Insert an asset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreErrorKind::AlreadyExists`] if an asset with the
    /// same `(path, type)` exists.
    pub fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        self.execute(
            "INSERT INTO assets (path, type, content) VALUES (?1, ?2, ?3)",
            &[
                SqlValue::Text(asset.path.clone()),
                SqlValue::Text(asset.kind.tag().to_owned()),
                SqlValue::Blob(asset.content.clone()),
            ],
        )
        .map_err(|e| e.with_path(&asset.path))?;
        Ok(())
    }

    /// Insert a page.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreErrorKind::AlreadyExists`] if a page with the
    /// same path exists.
    pub fn insert_page(&self, page: &Page) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO pages ({PAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)");
        self.execute(&sql, &page.to_params()?)
            .map_err(|e| e.with_path(&page.path))?;
        Ok(())
    }

    /// Look up an asset by exact path and kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn asset(&self, path: &str, kind: AssetKind) -> Result<Option<Asset>, StoreError> {
        let row = self.fetch_one(
            "SELECT path, content FROM assets WHERE path = ?1 AND type = ?2",
            &[
                SqlValue::Text(path.to_owned()),
                SqlValue::Text(kind.tag().to_owned()),
            ],
        )?;
        Ok(row.map(|row| Asset {
            path: row.text("path").unwrap_or(path).to_owned(),
            kind,
            content: row.bytes("content").map(<[u8]>::to_vec).unwrap_or_default(),
        }))
    }

    /// Paths of every asset of `kind`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn asset_paths(&self, kind: AssetKind) -> Result<Vec<String>, StoreError> {
        let rows = self.fetch_all(
            "SELECT path FROM assets WHERE type = ?1 ORDER BY path",
            &[SqlValue::Text(kind.tag().to_owned())],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.text("path").map(str::to_owned))
            .collect())
    }

    /// Number of asset rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_assets(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) AS n FROM assets")
    }

    /// Number of page rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_pages(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) AS n FROM pages")
    }

    fn count(&self, sql: &str) -> Result<usize, StoreError> {
        let n = self
            .fetch_one(sql, &[])?
            .and_then(|row| row.integer("n"))
            .unwrap_or(0);
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreErrorKind;

    fn page(path: &str, date: Option<&str>) -> Page {
        Page {
            path: path.to_owned(),
            slug: path.to_owned(),
            title: path.to_owned(),
            content: String::new(),
            template: "page".to_owned(),
            data: serde_json::Map::new(),
            published_date: date.map(str::to_owned),
        }
    }

    #[test]
    fn test_insert_and_lookup_asset() {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        store
            .insert_asset(&Asset::new("page.html", AssetKind::Template, "<p>x</p>"))
            .unwrap();

        let asset = store.asset("page.html", AssetKind::Template).unwrap().unwrap();
        assert_eq!(asset.text(), "<p>x</p>");
        assert!(store.asset("page.html", AssetKind::Script).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_asset_key_rejected() {
        let store = ContentStore::in_memory(DriverKind::Cursor).unwrap();
        let asset = Asset::new("logo.png", AssetKind::Image, "/images/logo.png");
        store.insert_asset(&asset).unwrap();

        let err = store.insert_asset(&asset).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AlreadyExists);

        // Same path, different kind is a different key
        store
            .insert_asset(&Asset::new("logo.png", AssetKind::Other, "x"))
            .unwrap();
        assert_eq!(store.count_assets().unwrap(), 2);
    }

    #[test]
    fn test_insert_page_round_trip() {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        let mut original = page("blog/post", Some("2024-01-01"));
        original
            .data
            .insert("tags".to_owned(), serde_json::json!(["a", "b"]));
        store.insert_page(&original).unwrap();

        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE path = ?1");
        let row = store
            .fetch_one(&sql, &[SqlValue::Text("blog/post".to_owned())])
            .unwrap()
            .unwrap();
        assert_eq!(Page::from_row(&row).unwrap(), original);
        assert_eq!(store.count_pages().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_page_rejected() {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        store.insert_page(&page("a", None)).unwrap();
        let err = store.insert_page(&page("a", None)).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AlreadyExists);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        let result: Result<(), StoreError> = store.transaction(|s| {
            s.insert_page(&page("a", None))?;
            s.insert_page(&page("a", None))
        });

        assert!(result.is_err());
        assert_eq!(store.count_pages().unwrap(), 0);
    }

    #[test]
    fn test_create_replaces_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("out").join("site.db");

        let store = ContentStore::create(&db, DriverKind::Accessor).unwrap();
        store.insert_page(&page("old", None)).unwrap();
        drop(store);

        let store = ContentStore::create(&db, DriverKind::Accessor).unwrap();
        assert_eq!(store.count_pages().unwrap(), 0);
        assert_eq!(store.location(), Some(db.as_path()));
    }

    #[test]
    fn test_open_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("site.db");
        let store = ContentStore::create(&db, DriverKind::Accessor).unwrap();
        store.insert_page(&page("a", None)).unwrap();
        drop(store);

        let store = ContentStore::open_read_only(&db, DriverKind::Cursor).unwrap();
        assert_eq!(store.driver_kind(), DriverKind::Cursor);
        assert_eq!(store.count_pages().unwrap(), 1);
        assert!(store.insert_page(&page("b", None)).is_err());
    }

    #[test]
    fn test_open_read_only_missing_file() {
        let err = ContentStore::open_read_only(Path::new("/nonexistent/site.db"), DriverKind::Cursor)
            .err()
            .unwrap();
        assert_eq!(err.kind, StoreErrorKind::NotFound);
    }

    #[test]
    fn test_asset_paths_sorted() {
        let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
        for name in ["b.html", "a.html"] {
            store
                .insert_asset(&Asset::new(name, AssetKind::Template, ""))
                .unwrap();
        }
        assert_eq!(
            store.asset_paths(AssetKind::Template).unwrap(),
            vec!["a.html", "b.html"]
        );
    }
}
