//! Caller side of the worker protocol.
//!
//! [`RpcClient`] encodes requests, tags each with a fresh correlation id and
//! waits for the matching response with a bounded timeout. Responses are
//! routed by id through [`PendingCalls`]; responses nobody waits for (stale,
//! duplicate or late after a timeout) are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::protocol::{Action, Request, Response};

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// RPC call error. Each error affects only the call that returned it.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No matching response within the timeout.
    #[error("No response within {0:?}")]
    Timeout(Duration),
    /// The worker channel is closed.
    #[error("Worker channel closed")]
    Closed,
    /// The worker answered with an error.
    #[error("Worker error: {0}")]
    Remote(String),
    /// Initialization failed earlier; the worker takes no more routes.
    #[error("Worker failed to initialize: {0}")]
    WorkerFailed(String),
    /// The response lacks the expected field.
    #[error("Malformed response: {0}")]
    Protocol(&'static str),
    /// The request could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Calls awaiting a response, keyed by correlation id.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<String, oneshot::Sender<Response>>>,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Response>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` and return the receiver for its response.
    pub fn register(&self, id: impl Into<String>) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.calls().insert(id.into(), tx);
        rx
    }

    /// Deliver `response` to its caller.
    ///
    /// Returns `false` if no call is waiting for its id.
    pub fn resolve(&self, response: Response) -> bool {
        let Some(tx) = self.calls().remove(&response.id) else {
            tracing::debug!(id = %response.id, "Ignoring response with unknown id");
            return false;
        };
        tx.send(response).is_ok()
    }

    /// Forget `id` without resolving it.
    pub fn cancel(&self, id: &str) -> bool {
        self.calls().remove(id).is_some()
    }

    /// Number of calls still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }
}

/// Async client of a worker.
#[derive(Debug)]
pub struct RpcClient {
    sender: UnboundedSender<String>,
    pending: Arc<PendingCalls>,
    timeout: Duration,
    failure: Mutex<Option<String>>,
    initialized: AtomicBool,
    dispatcher: JoinHandle<()>,
}

impl RpcClient {
    /// Connect to a worker through its channel ends.
    ///
    /// Spawns the response dispatcher on the current tokio runtime.
    #[must_use]
    pub fn new(
        sender: UnboundedSender<String>,
        receiver: UnboundedReceiver<String>,
        timeout: Duration,
    ) -> Self {
        let pending = Arc::new(PendingCalls::new());
        let dispatcher = tokio::spawn(dispatch(receiver, Arc::clone(&pending)));
        Self {
            sender,
            pending,
            timeout,
            failure: Mutex::new(None),
            initialized: AtomicBool::new(false),
            dispatcher,
        }
    }

    /// Calls still waiting for a response.
    #[must_use]
    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Timeout`] if no matching response arrives in
    /// time, [`RpcError::Closed`] if the worker is gone, or
    /// [`RpcError::Remote`] if the worker answered with an error.
    pub async fn call(&self, action: Action) -> Result<Response, RpcError> {
        let id = Uuid::new_v4().to_string();
        let message = Request::new(id.clone(), action).encode()?;
        let rx = self.pending.register(id.clone());

        if self.sender.send(message).is_err() {
            self.pending.cancel(&id);
            return Err(RpcError::Closed);
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(RpcError::Closed),
            Err(_) => {
                self.pending.cancel(&id);
                tracing::warn!(id = %id, timeout = ?self.timeout, "RPC call timed out");
                return Err(RpcError::Timeout(self.timeout));
            }
        };

        match response.error {
            Some(error) => Err(RpcError::Remote(error)),
            None => Ok(response),
        }
    }

    /// Initialize the worker.
    ///
    /// A failure is remembered and later route requests are refused.
    ///
    /// # Errors
    ///
    /// Returns the call error; remote failures are final.
    pub async fn init(&self) -> Result<(), RpcError> {
        if let Some(reason) = self.failure() {
            return Err(RpcError::WorkerFailed(reason));
        }
        match self.call(Action::Init).await {
            Ok(_) => {
                self.initialized.store(true, Ordering::Release);
                Ok(())
            }
            Err(RpcError::Remote(reason)) => {
                *self.failure.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(reason.clone());
                Err(RpcError::Remote(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `init` succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Render the page behind `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::WorkerFailed`] without contacting the worker if
    /// initialization failed, otherwise any call error.
    pub async fn handle_route(&self, path: &str) -> Result<String, RpcError> {
        if let Some(reason) = self.failure() {
            return Err(RpcError::WorkerFailed(reason));
        }
        let response = self
            .call(Action::HandleRoute {
                path: path.to_owned(),
            })
            .await?;
        response.html.ok_or(RpcError::Protocol("missing html"))
    }

    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(mut receiver: UnboundedReceiver<String>, pending: Arc<PendingCalls>) {
    while let Some(message) = receiver.recv().await {
        match Response::decode(&message) {
            Ok(response) => {
                pending.resolve(response);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping undecodable response"),
        }
    }
    tracing::debug!("Worker response channel closed");
}
