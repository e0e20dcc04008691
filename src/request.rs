//! Observable state for remote requests.
//!
//! A call returns a [`RequestHandle`] that reads [`RequestState::Loading`]
//! right away and later moves to exactly one terminal state. Calls launched
//! through the same [`RequestSlot`] replace each other: launching a new one
//! aborts the previous task and settles its handle as superseded.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{ApiError, ErrorKind};

/// Lifecycle of a single request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState<T> {
    Loading,
    Success(T),
    Error(RequestFailure),
}

impl<T> RequestState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }
}

/// Why a request ended without a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl RequestFailure {
    pub fn superseded() -> Self {
        Self {
            kind: ErrorKind::Superseded,
            message: "Request was superseded by a newer one".to_string(),
        }
    }
}

impl From<&ApiError> for RequestFailure {
    fn from(err: &ApiError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ApiError> for RequestFailure {
    fn from(err: ApiError) -> Self {
        Self::from(&err)
    }
}

/// Read side of one request
pub struct RequestHandle<T> {
    rx: watch::Receiver<RequestState<T>>,
}

impl<T: Clone> RequestHandle<T> {
    /// Snapshot of the current state
    pub fn state(&self) -> RequestState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the terminal state
    pub async fn settled(mut self) -> RequestState<T> {
        match self.rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            // The publisher is gone without settling; only an abort does that
            Err(_) => RequestState::Error(RequestFailure::superseded()),
        }
    }
}

/// Publish `state` unless the request already settled
fn settle<T>(tx: &watch::Sender<RequestState<T>>, state: RequestState<T>) -> bool {
    tx.send_if_modified(|current| {
        if current.is_loading() {
            *current = state;
            true
        } else {
            false
        }
    })
}

struct InFlight<T> {
    abort: AbortHandle,
    tx: Arc<watch::Sender<RequestState<T>>>,
}

impl<T> InFlight<T> {
    fn supersede(self) {
        self.abort.abort();
        if settle(&self.tx, RequestState::Error(RequestFailure::superseded())) {
            debug!("Superseded in-flight request");
        }
    }
}

/// Runs at most one request of a kind at a time
pub struct RequestSlot<T> {
    current: Mutex<Option<InFlight<T>>>,
}

impl<T> Default for RequestSlot<T> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RequestSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` on the tokio runtime, superseding the previous request.
    ///
    /// Must be called from within a runtime.
    pub fn launch<F>(&self, work: F) -> RequestHandle<T>
    where
        F: Future<Output = Result<T, RequestFailure>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(RequestState::Loading);
        let tx = Arc::new(tx);
        let task_tx = Arc::clone(&tx);

        let task = tokio::spawn(async move {
            let state = match work.await {
                Ok(value) => RequestState::Success(value),
                Err(failure) => RequestState::Error(failure),
            };
            settle(&task_tx, state);
        });

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(InFlight {
                abort: task.abort_handle(),
                tx,
            });
        if let Some(previous) = previous {
            previous.supersede();
        }

        RequestHandle { rx }
    }
}

impl<T> RequestSlot<T> {
    /// Abort the in-flight request, if any
    pub fn cancel(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(current) = current {
            current.supersede();
        }
    }
}

impl<T> Drop for RequestSlot<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
