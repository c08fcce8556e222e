//! `bake render` command implementation.
//!
//! Renders one route through the worker runtime instead of the build host:
//! the built database is mounted into the persistent block store and the
//! page is requested over the worker RPC protocol.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bake_build::{DATABASE_FILE, database_version};
use bake_cache::{CacheManifest, MANIFEST_FILE};
use bake_config::{CliSettings, Config, RuntimeConfig};
use bake_runtime::{FileBlockStore, FileSource, HostCapabilities, RpcClient, Worker, WorkerConfig};
use clap::Args;

use crate::error::CliError;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Route to render (e.g. `/blog/post`).
    route: String,

    /// Path to configuration file (default: auto-discover bake.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Build output directory holding the site database (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl RenderArgs {
    /// Execute the render command, writing the HTML to stdout.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let cli_settings = CliSettings {
            output_dir: self.output_dir,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let client = start_worker(&config.build_resolved.output_dir, &config.runtime_resolved)?;
        client.init().await?;
        let html = client.handle_route(&self.route).await?;

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(html.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

/// Spawn a worker over the database in `output_dir`.
pub(crate) fn start_worker(output_dir: &Path, runtime: &RuntimeConfig) -> Result<RpcClient, CliError> {
    let db = output_dir.join(DATABASE_FILE);
    if !db.is_file() {
        return Err(CliError::Validation(format!(
            "Site database not found: {} (run `bake build` first)",
            db.display()
        )));
    }

    let version = site_version(output_dir, &db)?;
    tracing::info!(version = %version, db = %db.display(), "Starting worker");

    let blocks = FileBlockStore::open(&runtime.blocks_dir, runtime.page_size)?;
    let worker = Worker::new(
        WorkerConfig::new(version).with_capabilities(HostCapabilities {
            shared_memory: runtime.shared_memory,
        }),
        Arc::new(blocks),
        Arc::new(FileSource::new(db)),
    );
    Ok(bake_runtime::connect(worker, runtime.rpc_timeout)?)
}

/// Version tag of the built site.
///
/// Taken from the cache manifest; hashed from the database if the manifest
/// is missing or unreadable.
fn site_version(output_dir: &Path, db: &Path) -> Result<String, CliError> {
    match CacheManifest::read(&output_dir.join(MANIFEST_FILE)) {
        Ok(manifest) => Ok(manifest.version),
        Err(e) => {
            tracing::debug!(error = %e, "No usable cache manifest, hashing database");
            Ok(database_version(db)?)
        }
    }
}
