//! HTTP server for Bake build output.
//!
//! Serves the static output of `bake build` with axum:
//! - files from the output directory via `tower-http`
//! - `index.html` for directories and `<route>.html` for clean URLs
//! - a generated 404 page for everything else
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use bake_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         host: "127.0.0.1".to_owned(),
//!         port: 7979,
//!         output_dir: PathBuf::from("public"),
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```

mod app;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Build output directory to serve.
    pub output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
            output_dir: PathBuf::from("public"),
        }
    }
}

/// Server error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Nothing has been built yet.
    #[error("Output directory not found: {} (run `bake build` first)", .0.display())]
    OutputNotFound(PathBuf),
    #[error("Invalid address {0}")]
    Address(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the output directory is missing or the server fails
/// to start.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    if !config.output_dir.is_dir() {
        return Err(ServerError::OutputNotFound(config.output_dir));
    }

    let address = format!("{}:{}", config.host, config.port);
    let addr = SocketAddr::from_str(&address).map_err(|_| ServerError::Address(address))?;

    let app = app::create_router(config.output_dir.clone());
    tracing::info!(address = %addr, output = %config.output_dir.display(), "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from Bake config.
#[must_use]
pub fn server_config_from_config(config: &bake_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        output_dir: config.build_resolved.output_dir.clone(),
    }
}
