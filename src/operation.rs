//! Cancellable asynchronous operations
//!
//! [`Operation`] runs a future on the tokio runtime and hands back a handle
//! that can cancel it, await it or attach a completion callback. Cancelling
//! drops the in-flight future, which aborts its network call and any retry
//! back-off, and resolves the operation with [`FileShareError::Cancelled`].

use crate::error::{FileShareError, Result};
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Operation<T> {
    token: CancellationToken,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Operation<T> {
    /// Spawn `future` with its own cancellation token.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::spawn_with_token(future, CancellationToken::new())
    }

    /// Spawn `future` so that cancelling `token` (or any parent of it)
    /// cancels the operation.
    pub fn spawn_with_token<F>(future: F, token: CancellationToken) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    debug!("operation cancelled");
                    Err(FileShareError::Cancelled)
                }
                result = future => result,
            }
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the outcome.
    pub async fn join(self) -> Result<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(FileShareError::Cancelled),
        }
    }

    /// Run `callback` with the outcome once the operation completes.
    pub fn on_complete<C>(self, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<T>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.join().await) })
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
