//! Render facade and template engine for Bake.
//!
//! This crate provides:
//! - [`Baker`]: the single query/render contract shared by the build host
//!   and the worker runtime
//! - a minijinja-based template engine whose inheritance chain is resolved
//!   through the content store
//! - an explicit [`FilterTable`] of template filters
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::path::Path;
//!
//! use bake_site::{Baker, BakerConfig, Host};
//! use bake_store::{ContentStore, DriverKind};
//!
//! let store = ContentStore::open_read_only(Path::new("public/site.db"), DriverKind::Accessor)?;
//! let baker = Baker::new(store, BakerConfig::new(Host::Build));
//!
//! if let Some(page) = baker.get_page("blog/post") {
//!     let html = baker.render_page(&page);
//! }
//! # Ok(())
//! # }
//! ```

mod baker;
mod error;
mod error_page;
mod template;
mod validate;

pub use baker::{AssetValue, Baker, BakerConfig, DEFAULT_PAGE_LIMIT, Host};
pub use error::{RenderError, ValidationError};
pub use template::{CompiledTemplate, DEFAULT_DATE_FORMAT, FilterFn, FilterTable, Markup};
pub use validate::{TEMPLATE_EXTENSION, normalize_asset_name, validate_page_path};
