//! Cancellable background tasks, joined on shutdown.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::context::{cancellation, CancelHandle, CancellationToken};

/// A spawned loop with its own stop signal.
///
/// Dropping the task without [`BackgroundTask::shutdown`] still stops it: the
/// stop signal fires and the spawned future is aborted.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    cancel: CancelHandle,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `f` with a token that fires on [`BackgroundTask::shutdown`].
    pub fn spawn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, token) = cancellation();
        let name = name.into();
        debug!(task = %name, "background task started");
        Self {
            handle: tokio::spawn(f(token)),
            name,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the loop already returned on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the stop and wait for the loop to return.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        match (&mut self.handle).await {
            Ok(()) => debug!(task = %self.name, "background task stopped"),
            Err(e) => warn!(task = %self.name, error = %e, "background task failed"),
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.handle.is_finished() {
            debug!(task = %self.name, "background task dropped, aborting");
            self.handle.abort();
        }
    }
}
