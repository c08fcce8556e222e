//! Relational content store for Bake.
//!
//! The store holds two tables, `assets` and `pages`, plus the site metadata
//! record (an asset of kind [`AssetKind::Data`] at [`SITE_META_PATH`]). It is
//! written once by the loader and read by exactly one `Baker` afterwards.
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Asset`] / [`AssetKind`] and [`Page`] row types
//! - [`ContentStore`] owning the SQLite connection behind a mutex
//! - [`StatementDriver`] with two access conventions selected at construction:
//!   [`DriverKind::Accessor`] (single-row / all-rows accessors) and
//!   [`DriverKind::Cursor`] (explicit row stepping)
//!
//! Callers never see which driver is in use; both return [`Row`]s.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), bake_store::StoreError> {
//! use bake_store::{Asset, AssetKind, ContentStore, DriverKind};
//!
//! let store = ContentStore::in_memory(DriverKind::Accessor)?;
//! store.insert_asset(&Asset::new("page.html", AssetKind::Template, "<h1>{{ page.title }}</h1>"))?;
//! assert_eq!(store.count_assets()?, 1);
//! # Ok(())
//! # }
//! ```

mod asset;
mod driver;
mod error;
mod page;
mod store;

pub use asset::{Asset, AssetKind, SITE_META_PATH};
pub use driver::{AccessorDriver, CursorDriver, DriverKind, Row, SqlValue, StatementDriver};
pub use error::{StoreError, StoreErrorKind};
pub use page::{PAGE_COLUMNS, Page, slugify, validate_page_path};
pub use store::{ContentStore, SCHEMA};
