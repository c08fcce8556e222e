//! Configuration management for Bake.
//!
//! Parses `bake.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories. Relative paths are
//! resolved against the directory of the config file.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - every string in `[site]`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override draft inclusion.
    pub drafts: Option<bool>,
    /// Override output directory.
    pub output_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
pub const CONFIG_FILENAME: &str = "bake.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site-wide data merged into the site record (free-form).
    pub site: Map<String, Value>,
    /// Build configuration (paths are relative strings from TOML).
    build: BuildConfigRaw,
    /// Metadata configuration.
    pub metadata: MetadataConfig,
    /// Server configuration.
    pub server: ServerConfig,
    /// Worker runtime configuration.
    runtime: RuntimeConfigRaw,
    /// Offline cache configuration.
    pub cache: CacheConfig,

    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: BuildConfig,
    /// Resolved runtime configuration (set after loading).
    #[serde(skip)]
    pub runtime_resolved: RuntimeConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw build configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    content_dir: Option<String>,
    assets_dir: Option<String>,
    output_dir: Option<String>,
    drafts: Option<bool>,
}

/// Resolved build configuration with absolute paths.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Content tree (pages, images, passthrough).
    pub content_dir: PathBuf,
    /// Asset tree (templates, css, data, js).
    pub assets_dir: PathBuf,
    /// Build output directory.
    pub output_dir: PathBuf,
    /// Whether draft pages are built.
    pub drafts: bool,
}

/// Metadata configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Filename of per-directory metadata files.
    pub name: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            name: "meta.yaml".to_owned(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
        }
    }
}

/// Raw runtime configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RuntimeConfigRaw {
    rpc_timeout_ms: Option<u64>,
    page_size: Option<usize>,
    blocks_dir: Option<String>,
    shared_memory: Option<bool>,
}

/// Resolved worker runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Time to wait for a worker response.
    pub rpc_timeout: Duration,
    /// Block store page size in bytes.
    pub page_size: usize,
    /// Directory of the persistent block store.
    pub blocks_dir: PathBuf,
    /// Whether the database may be opened in place.
    pub shared_memory: bool,
}

impl RuntimeConfig {
    const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    const DEFAULT_PAGE_SIZE: usize = 4096;

    fn with_base(base: &Path) -> Self {
        Self {
            rpc_timeout: Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
            page_size: Self::DEFAULT_PAGE_SIZE,
            blocks_dir: base.join(".bake").join("blocks"),
            shared_memory: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::with_base(Path::new("."))
    }
}

/// Offline cache configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// URL of the offline fallback page.
    pub offline_page: String,
    /// Extra URLs to precache besides the build output.
    pub precache: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            offline_page: "/offline.html".to_owned(),
            precache: Vec::new(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`site.url`").
        field: String,
        /// Error message (e.g., "${`SITE_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to be site-absolute.
fn require_absolute_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "{field} must start with /, got {url:?}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `bake.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(drafts) = settings.drafts {
            self.build_resolved.drafts = drafts;
        }
        if let Some(output_dir) = &settings.output_dir {
            self.build_resolved.output_dir.clone_from(output_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        discover_from(&current)
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    #[must_use]
    pub fn default_with_base(base: &Path) -> Self {
        Self {
            site: Map::new(),
            build: BuildConfigRaw::default(),
            metadata: MetadataConfig::default(),
            server: ServerConfig::default(),
            runtime: RuntimeConfigRaw::default(),
            cache: CacheConfig::default(),
            build_resolved: BuildConfig {
                content_dir: base.join("pages"),
                assets_dir: base.join("assets"),
                output_dir: base.join("public"),
                drafts: false,
            },
            runtime_resolved: RuntimeConfig::with_base(base),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        require_non_empty(&self.metadata.name, "metadata.name")?;
        self.validate_runtime()?;
        self.validate_cache()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 lets the OS pick a port, which is never what a config file means
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_runtime(&self) -> Result<(), ConfigError> {
        const MIN_PAGE_SIZE: usize = 512;
        const MAX_PAGE_SIZE: usize = 65_536;

        if self.runtime_resolved.rpc_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "runtime.rpc_timeout_ms must be greater than 0".to_owned(),
            ));
        }
        let page_size = self.runtime_resolved.page_size;
        if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ConfigError::Validation(format!(
                "runtime.page_size must be a power of two between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        require_absolute_url(&self.cache.offline_page, "cache.offline_page")?;
        for url in &self.cache.precache {
            require_absolute_url(url, "cache.precache")?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        for (key, value) in &mut self.site {
            expand::expand_value(value, &format!("site.{key}"))?;
        }
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.build_resolved = BuildConfig {
            content_dir: resolve(self.build.content_dir.as_deref(), "pages"),
            assets_dir: resolve(self.build.assets_dir.as_deref(), "assets"),
            output_dir: resolve(self.build.output_dir.as_deref(), "public"),
            drafts: self.build.drafts.unwrap_or(false),
        };

        let defaults = RuntimeConfig::with_base(config_dir);
        self.runtime_resolved = RuntimeConfig {
            rpc_timeout: self
                .runtime
                .rpc_timeout_ms
                .map_or(defaults.rpc_timeout, Duration::from_millis),
            page_size: self.runtime.page_size.unwrap_or(defaults.page_size),
            blocks_dir: self
                .runtime
                .blocks_dir
                .as_deref()
                .map_or(defaults.blocks_dir, |d| config_dir.join(d)),
            shared_memory: self.runtime.shared_memory.unwrap_or(defaults.shared_memory),
        };
    }
}

/// Search `start` and its parents for `bake.toml`.
fn discover_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILENAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}
