//! Network access seen by the service worker.

use std::future::Future;

use crate::{Request, Response};

/// Network fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No connectivity.
    #[error("Network unavailable")]
    Offline,
    /// Any other transport failure.
    #[error("Fetch failed: {0}")]
    Failed(String),
}

/// Host-provided network fetch.
///
/// HTTP error statuses are responses, not errors.
pub trait Network: Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}
