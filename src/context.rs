//! Deadline and cancellation for one exchange.
//!
//! An [`ExchangeContext`] covers the whole exchange, from the capability check
//! to the final chunk. Every suspension point runs through
//! [`ExchangeContext::run`], which turns cancellation into
//! [`ReqRespError::Cancelled`] and deadline expiry into
//! [`ReqRespError::Timeout`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use beacon_reqresp::context::{cancellation, ExchangeContext};
//!
//! let (handle, token) = cancellation();
//! let ctx = ExchangeContext::new()
//!     .with_timeout(Duration::from_secs(20))
//!     .with_cancellation(token);
//! handle.cancel();
//! assert!(ctx.is_cancelled());
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ReqRespError, Result};

/// Receiving side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Create a linked cancel handle and token.
pub fn cancellation() -> (CancelHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancellationToken { rx })
}

impl CancelHandle {
    /// Signal cancellation to every token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if cancellation was signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is signalled. Pends forever if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Deadline and cancellation shared by all suspension points of an exchange.
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl ExchangeContext {
    /// No deadline, never cancelled.
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::never(),
        }
    }

    /// Set the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the exchange was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one suspension point under the deadline and cancellation signal.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(ReqRespError::Cancelled);
        }
        let mut cancel = self.cancel.clone();
        let deadline = self.deadline;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReqRespError::Cancelled),
            res = async move {
                match deadline {
                    Some(at) => tokio::time::timeout_at(at, fut)
                        .await
                        .map_err(|_| ReqRespError::Timeout)?,
                    None => fut.await,
                }
            } => res,
        }
    }
}

impl Default for ExchangeContext {
    fn default() -> Self {
        Self::new()
    }
}
