//! CLI error types.

use bake_build::BuildError;
use bake_config::ConfigError;
use bake_runtime::{BlockStoreError, RpcError};
use bake_server::ServerError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("{0}")]
    Blocks(#[from] BlockStoreError),

    #[error("{0}")]
    Rpc(#[from] RpcError),

    #[error("{0}")]
    Validation(String),
}
