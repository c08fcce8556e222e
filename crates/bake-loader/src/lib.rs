//! Content loader for Bake.
//!
//! Walks a content tree and an asset tree and fills a
//! [`bake_store::ContentStore`]:
//!
//! - directory metadata files are inherited down the tree (child keys win)
//! - each directory's mixer turns files into pages or image assets
//! - asset files are stored verbatim, typed by their parent directory
//! - a site metadata asset is synthesized from the data directory and config
//!
//! One bad file never aborts a load; it is logged and listed in the
//! [`LoadReport`].
//!
//! # Example
//!
//! ```no_run
//! use bake_loader::{Loader, LoaderConfig};
//! use bake_store::{ContentStore, DriverKind};
//!
//! let store = ContentStore::in_memory(DriverKind::Accessor).unwrap();
//! let config = LoaderConfig::new("pages", "public").with_assets_dir("assets");
//! let report = Loader::new(config).load(&store).unwrap();
//! println!("{} pages", report.pages);
//! ```

mod assets;
mod error;
mod front_matter;
mod loader;
mod markdown;
mod metadata;
mod mixer;
mod scanner;

pub use error::LoadError;
pub use loader::{DEFAULT_META_FILENAME, LoadFailure, LoadReport, Loader, LoaderConfig};
pub use metadata::{Metadata, MetadataError, merge_metadata, parse_metadata};
pub use mixer::{DEFAULT_TEMPLATE, MixerKind};
