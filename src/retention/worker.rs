use super::pruner::RetentionPruner;
use crate::core::{CaptureError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

const MIN_TICK: Duration = Duration::from_millis(10);

/// Background task calling [`RetentionPruner::try_prune`] on a fixed tick.
/// The pruner's own gate decides whether a tick actually prunes.
pub struct RetentionWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl RetentionWorker {
    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| CaptureError::StorageError(format!("retention worker join: {err}")))?;
        }
        Ok(())
    }
}

impl Drop for RetentionWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

pub fn spawn_retention_worker(pruner: Arc<RetentionPruner>, tick: Duration) -> RetentionWorker {
    let tick = tick.max(MIN_TICK);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = sleep(tick) => {
                    let outcome = pruner.try_prune().await;
                    debug!(?outcome, "retention tick");
                }
            }
        }
    });

    RetentionWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SystemClock;
    use crate::gateway::{DocumentLogRepository, LogRepository, SettingsCache};

    #[tokio::test]
    async fn worker_prunes_on_first_tick_and_stops() {
        let repo = Arc::new(DocumentLogRepository::in_memory());
        let settings = Arc::new(SettingsCache::new(repo.clone()));
        let pruner = Arc::new(RetentionPruner::new(repo.clone(), settings, Arc::new(SystemClock)));

        let worker = spawn_retention_worker(pruner.clone(), Duration::from_millis(10));
        for _ in 0..100 {
            if pruner.last_attempt().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        worker.stop().await.unwrap();

        assert!(pruner.last_attempt().is_some());
        assert!(repo.latest_statistics().await.unwrap().unwrap().last_prune.is_some());
    }
}
