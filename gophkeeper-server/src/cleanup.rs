//! Background cleanup task: prune expired client tokens.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use crate::deadline;
use crate::server::wait_for_shutdown;
use crate::storage::{SqliteStorage, Storage};

pub fn spawn_cleanup_task(
    storage: SqliteStorage,
    every: Duration,
    operation_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = interval.tick() => {
                    if let Err(e) = run_cleanup(&storage, operation_timeout).await {
                        tracing::error!("Cleanup error: {}", e);
                    }
                }
            }
        }
    })
}

pub async fn run_cleanup(
    storage: &SqliteStorage,
    operation_timeout: Duration,
) -> Result<u64, crate::error::ServerError> {
    let storage = storage.clone();
    let now = Utc::now().timestamp();
    let removed = deadline::run_blocking(operation_timeout, move |ctx| {
        storage.atomically(ctx, |store| store.delete_expired_tokens(now))
    })
    .await?;

    if removed > 0 {
        tracing::info!(removed, "pruned expired tokens");
    } else {
        tracing::debug!("Cleanup completed");
    }
    Ok(removed)
}
