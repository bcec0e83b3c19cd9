//! Per-call deadlines for blocking store operations.
//!
//! Every store call runs on the blocking pool. When the deadline passes, or
//! the request future is dropped because the client went away, the call's
//! [`CallContext`] is cancelled and the SQLite progress handler aborts the
//! running statement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServerError;

/// Cancellation flag shared between a request and its blocking store call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Handle for code that must poll the flag from another thread.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

/// Cancels the context when dropped.
struct CancelOnDrop(CallContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `op` on the blocking pool, giving up after `timeout`.
pub async fn run_blocking<T, E, F>(timeout: Duration, op: F) -> Result<T, ServerError>
where
    F: FnOnce(&CallContext) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ServerError> + Send + 'static,
{
    let ctx = CallContext::new();
    // Covers both the timeout and the request future being dropped. On the
    // success path the operation has already returned.
    let _guard = CancelOnDrop(ctx.clone());

    let task_ctx = ctx.clone();
    let handle = tokio::task::spawn_blocking(move || op(&task_ctx));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result.map_err(Into::into),
        Ok(Err(e)) => Err(ServerError::Internal(format!("store task failed: {}", e))),
        Err(_) => {
            ctx.cancel();
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "operation deadline exceeded");
            Err(ServerError::DeadlineExceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_operation_result() {
        let value = run_blocking(Duration::from_secs(1), |_ctx| Ok::<_, ServerError>(42))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn maps_operation_error() {
        let err = run_blocking(Duration::from_secs(1), |_ctx| {
            Err::<(), _>(ServerError::Validation("bad".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[tokio::test]
    async fn deadline_cancels_context() {
        let (tx, rx) = std::sync::mpsc::channel();
        let err = run_blocking(Duration::from_millis(50), move |ctx| {
            let flag = ctx.flag();
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            tx.send(()).unwrap();
            Ok::<_, ServerError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::DeadlineExceeded));
        rx.recv_timeout(Duration::from_secs(2))
            .expect("operation should observe cancellation");
    }

    #[tokio::test]
    async fn dropping_the_future_cancels_context() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let call = tokio::spawn(run_blocking(Duration::from_secs(30), move |ctx| {
            let _ = started_tx.send(());
            let flag = ctx.flag();
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            done_tx.send(()).unwrap();
            Ok::<_, ServerError>(())
        }));

        started_rx.await.unwrap();
        call.abort();

        tokio::task::spawn_blocking(move || done_rx.recv_timeout(Duration::from_secs(2)))
            .await
            .unwrap()
            .expect("aborted call should be cancelled");
    }
}
