//! `bake new` command implementation.

use std::fs;
use std::path::{Path, PathBuf};

use bake_config::CONFIG_FILENAME;
use clap::Args;

use crate::error::CliError;
use crate::output::Output;

/// Files of a new site, relative to its root.
const SCAFFOLD: &[(&str, &str)] = &[
    (CONFIG_FILENAME, include_str!("../scaffold/bake.toml")),
    (".gitignore", include_str!("../scaffold/gitignore")),
    ("pages/index.md", include_str!("../scaffold/pages/index.md")),
    (
        "assets/templates/base.html",
        include_str!("../scaffold/assets/templates/base.html"),
    ),
    (
        "assets/templates/page.html",
        include_str!("../scaffold/assets/templates/page.html"),
    ),
    (
        "assets/data/site.yaml",
        include_str!("../scaffold/assets/data/site.yaml"),
    ),
    (
        "assets/css/site.css",
        include_str!("../scaffold/assets/css/site.css"),
    ),
];

/// Arguments for the new command.
#[derive(Args)]
pub(crate) struct NewArgs {
    /// Directory to create the site in (must be empty or missing).
    dest: PathBuf,
}

impl NewArgs {
    /// Execute the new command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        new_site(&self.dest)?;
        output.success(&format!("Created new site in {}", self.dest.display()));
        output.info(&format!(
            "Next: cd {} && bake build && bake serve",
            self.dest.display()
        ));
        Ok(())
    }
}

/// Write the scaffold into `dest`.
///
/// # Errors
///
/// Returns [`CliError::Validation`] if `dest` exists and is not an empty
/// directory.
pub(crate) fn new_site(dest: &Path) -> Result<(), CliError> {
    if !is_dir_empty(dest)? {
        return Err(CliError::Validation(format!(
            "Destination {} is not empty",
            dest.display()
        )));
    }

    for (rel, content) in SCAFFOLD {
        let path = dest.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        tracing::debug!(path = %path.display(), "Wrote scaffold file");
    }
    Ok(())
}

/// Check if a path is missing or an empty directory.
fn is_dir_empty(path: &Path) -> Result<bool, CliError> {
    if !path.exists() {
        return Ok(true);
    }
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}
