use super::SyncEngine;
use crate::core::{Result, SyncError};
use crate::model::EntityPayload;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration as TokioDuration, sleep};
use tracing::{Level, event};

const MIN_PURGE_TICK_MS: u64 = 10;

/// Background worker that fires elapsed grace-window timers.
pub struct PurgeWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl PurgeWorker {
    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| SyncError::InvalidState(format!("purge worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for PurgeWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the purge worker for `engine`, ticking every `purge_tick_ms`.
pub fn spawn_purge_worker<P: EntityPayload>(engine: SyncEngine<P>) -> PurgeWorker {
    let interval_ms = engine.config().purge_tick_ms.max(MIN_PURGE_TICK_MS);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = sleep(TokioDuration::from_millis(interval_ms)) => {
                    let purged = engine.purge_expired().await;
                    if purged > 0 {
                        event!(Level::DEBUG, purged, "purge tick");
                    }
                }
            }
        }
    });

    PurgeWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
