//! Worker runtime for Bake.
//!
//! Serves pages on demand from a shipped site database, the same way the
//! build host renders them:
//!
//! - [`BlockStore`]: persistent page-addressed storage for the database
//!   image, so it survives restarts without fetching it again
//! - [`mount`]: opens the image in place, or through a bulk-read scratch copy
//!   when the host lacks shared memory
//! - [`Worker`]: the `init` / `handleRoute` state machine around one
//!   [`bake_site::Baker`]
//! - [`RpcClient`]: async caller with correlation ids and timeouts
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use bake_runtime::{FileBlockStore, FileSource, Worker, WorkerConfig, DEFAULT_PAGE_SIZE};
//!
//! let blocks = FileBlockStore::open(".bake/blocks", DEFAULT_PAGE_SIZE)?;
//! let worker = Worker::new(
//!     WorkerConfig::new("3f2a9c0d1b7e4f55"),
//!     Arc::new(blocks),
//!     Arc::new(FileSource::new("public/site.db")),
//! );
//!
//! let client = bake_runtime::connect(worker, bake_runtime::DEFAULT_TIMEOUT)?;
//! client.init().await?;
//! let html = client.handle_route("/blog/post").await?;
//! # Ok(())
//! # }
//! ```

mod block_store;
mod client;
mod mount;
mod protocol;
mod route;
mod worker;

use std::time::Duration;

pub use block_store::{
    BlockStore, BlockStoreError, DEFAULT_PAGE_SIZE, FileBlockStore, MemoryBlockStore,
};
pub use client::{DEFAULT_TIMEOUT, PendingCalls, RpcClient, RpcError};
pub use mount::{
    BytesSource, DatabaseSource, FileSource, HostCapabilities, MountError, MountMode,
    MountedDatabase, mount,
};
pub use protocol::{Action, Request, Response};
pub use route::{normalize_route, not_found_page, render_route, resolve_route, route_candidates};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerState, spawn_worker};

/// Start `worker` on its own thread and return a client for it.
///
/// The worker thread exits when the client is dropped.
///
/// # Errors
///
/// Returns an error if the worker thread cannot be spawned.
pub fn connect(worker: Worker, timeout: Duration) -> std::io::Result<RpcClient> {
    let handle = spawn_worker(worker)?;
    Ok(RpcClient::new(handle.sender, handle.receiver, timeout))
}
