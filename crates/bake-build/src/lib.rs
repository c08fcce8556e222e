//! Build host for Bake.
//!
//! [`StaticSiteBuilder`] recreates the site database from the content and
//! asset trees, renders every page through the same [`bake_site::Baker`]
//! the runtime uses, and writes the static output:
//!
//! ```text
//! public/
//! ├── site.db               content store
//! ├── <page>.html           one file per page
//! ├── images/, css/, js/    copied assets
//! ├── offline.html          offline fallback page
//! └── cache-manifest.json   precache list and version tag
//! ```
//!
//! A page that fails to render gets an error page and is counted; the build
//! carries on and reports the failures at the end.

mod builder;

pub use builder::{
    BuildConfig, BuildError, BuildReport, DATABASE_FILE, OFFLINE_FILE, PageFailure,
    StaticSiteBuilder, database_version, page_file,
};
