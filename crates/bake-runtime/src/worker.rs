//! Worker state machine and thread.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use bake_site::{Baker, BakerConfig, Host};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::block_store::BlockStore;
use crate::mount::{DatabaseSource, HostCapabilities, mount};
use crate::protocol::{Action, Request, Response};
use crate::route::render_route;

/// Worker lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Handling,
    /// Initialization failed; terminal.
    Failed(String),
}

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Version tag of the expected database image.
    pub db_version: String,
    pub capabilities: HostCapabilities,
}

impl WorkerConfig {
    #[must_use]
    pub fn new(db_version: impl Into<String>) -> Self {
        Self {
            db_version: db_version.into(),
            capabilities: HostCapabilities::default(),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Runtime host owning one Baker over the mounted database.
pub struct Worker {
    config: WorkerConfig,
    blocks: Arc<dyn BlockStore>,
    source: Arc<dyn DatabaseSource>,
    state: WorkerState,
    baker: Option<Baker>,
    scratch: Option<TempDir>,
}

impl Worker {
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        blocks: Arc<dyn BlockStore>,
        source: Arc<dyn DatabaseSource>,
    ) -> Self {
        Self {
            config,
            blocks,
            source,
            state: WorkerState::Uninitialized,
            baker: None,
            scratch: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Handle one request.
    pub fn handle(&mut self, request: Request) -> Response {
        match request.action {
            Action::Init => self.init(request.id),
            Action::HandleRoute { path } => self.handle_route(request.id, &path),
        }
    }

    /// Handle one JSON-encoded request, returning the JSON response.
    ///
    /// Undecodable messages get an error response when their id can be
    /// recovered and are dropped otherwise.
    pub fn handle_message(&mut self, text: &str) -> Option<String> {
        let response = match Request::decode(text) {
            Ok(request) => self.handle(request),
            Err(e) => {
                let id = serde_json::from_str::<serde_json::Value>(text)
                    .ok()
                    .and_then(|v| v.get("id")?.as_str().map(str::to_owned));
                let Some(id) = id else {
                    tracing::warn!(error = %e, "Dropping undecodable message");
                    return None;
                };
                Response::error(id, format!("invalid request: {e}"))
            }
        };
        match response.encode() {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(id = %response.id, error = %e, "Failed to encode response");
                None
            }
        }
    }

    fn init(&mut self, id: String) -> Response {
        match &self.state {
            WorkerState::Ready => return Response::result(id, json!(true)),
            WorkerState::Failed(reason) => {
                return Response::error(id, format!("worker failed: {reason}"));
            }
            WorkerState::Uninitialized | WorkerState::Initializing | WorkerState::Handling => {}
        }

        self.state = WorkerState::Initializing;
        match mount(
            self.blocks.as_ref(),
            self.source.as_ref(),
            &self.config.db_version,
            self.config.capabilities,
        ) {
            Ok(mounted) => {
                let mode = mounted.mode();
                let (store, scratch) = mounted.into_parts();
                self.baker = Some(Baker::new(store, BakerConfig::new(Host::Browser)));
                self.scratch = scratch;
                self.state = WorkerState::Ready;
                tracing::info!(?mode, version = %self.config.db_version, "Worker ready");
                Response::result(id, json!(true))
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(error = %reason, "Worker initialization failed");
                self.state = WorkerState::Failed(reason.clone());
                Response::error(id, reason)
            }
        }
    }

    fn handle_route(&mut self, id: String, path: &str) -> Response {
        if let WorkerState::Failed(reason) = &self.state {
            return Response::error(id, format!("worker failed: {reason}"));
        }
        let Some(baker) = self.baker.clone() else {
            return Response::error(id, "worker not initialized");
        };

        self.state = WorkerState::Handling;
        let html = render_route(&baker, path);
        self.state = WorkerState::Ready;
        Response::html(id, html)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Channel ends of a running worker thread.
pub struct WorkerHandle {
    /// Requests to the worker.
    pub sender: UnboundedSender<String>,
    /// Responses from the worker.
    pub receiver: UnboundedReceiver<String>,
    /// The worker thread; exits once `sender` is dropped.
    pub thread: JoinHandle<()>,
}

/// Run `worker` on a dedicated thread, one message at a time.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_worker(mut worker: Worker) -> std::io::Result<WorkerHandle> {
    let (request_tx, mut request_rx) = unbounded_channel::<String>();
    let (response_tx, response_rx) = unbounded_channel::<String>();

    let thread = std::thread::Builder::new()
        .name("bake-worker".to_owned())
        .spawn(move || {
            while let Some(message) = request_rx.blocking_recv() {
                let Some(response) = worker.handle_message(&message) else {
                    continue;
                };
                if response_tx.send(response).is_err() {
                    break;
                }
            }
            tracing::debug!("Worker thread stopped");
        })?;

    Ok(WorkerHandle {
        sender: request_tx,
        receiver: response_rx,
        thread,
    })
}
