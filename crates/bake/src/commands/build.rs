//! `bake build` command implementation.

use std::path::PathBuf;

use bake_build::{BuildConfig, StaticSiteBuilder};
use bake_config::{CliSettings, Config};
use clap::Args;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Path to configuration file (default: auto-discover bake.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Include draft pages.
    #[arg(long)]
    drafts: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildArgs {
    /// Execute the build command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or the build fails, or if any page
    /// failed to render.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            drafts: self.drafts.then_some(true),
            output_dir: self.output_dir,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let build_config = BuildConfig::from(&config);

        output.heading(&format!(
            "Building {}",
            build_config.content_dir.display()
        ));
        output.info(&format!("Output: {}", build_config.output_dir.display()));
        if build_config.drafts {
            output.info("Drafts: included");
        }

        let report = StaticSiteBuilder::new(build_config).build()?;

        output.build_report(&report);

        if !report.is_success() {
            return Err(CliError::Validation(format!(
                "{} of {} pages failed to render",
                report.failures.len(),
                report.pages + report.failures.len()
            )));
        }
        Ok(())
    }
}
