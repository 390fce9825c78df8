//! Backend health polling
//!
//! A background task probes `GET /` on a fixed interval and publishes
//! online/offline on a watch channel. The task is owned: `stop()` ends it,
//! and dropping the monitor aborts it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::Backend;

pub struct HealthMonitor {
    status: watch::Receiver<bool>,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Spawn the poller. The first probe runs immediately.
    pub fn start<B: Backend>(backend: Arc<B>, every: Duration) -> Self {
        let (status_tx, status_rx) = watch::channel(false);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let online = backend.check_health().await;
                        let changed = status_tx.send_if_modified(|current| {
                            let changed = *current != online;
                            *current = online;
                            changed
                        });
                        if changed {
                            tracing::info!(online, "backend status changed");
                        }
                    }
                }
            }
            tracing::debug!("health monitor stopped");
        });

        Self {
            status: status_rx,
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }

    /// Stop polling and wait for the task to finish
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
