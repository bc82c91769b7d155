//! Housekeeping that runs beside the request path.
//!
//! A [`Housekeeper`] is driven by a [`HousekeepingWorker`]: a tokio task that
//! sweeps on a fixed period until it is stopped, then makes a final pass.
//! The session reaper is the housekeeper the server runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::network::SessionStore;

#[async_trait]
pub trait Housekeeper: Send + 'static {
    /// Periodic pass.
    async fn sweep(&mut self);

    /// Final pass once the worker is told to stop.
    async fn finish(&mut self) {}
}

/// Purges sessions that outlived the store's TTL.
#[derive(Debug)]
pub struct SessionReaper {
    sessions: Arc<SessionStore>,
}

impl SessionReaper {
    #[must_use]
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Housekeeper for SessionReaper {
    async fn sweep(&mut self) {
        let purged = self.sessions.purge_expired();
        if purged > 0 {
            info!(purged, live = self.sessions.len(), "Purged idle sessions");
        } else {
            debug!(live = self.sessions.len(), "No idle sessions to purge");
        }
    }

    async fn finish(&mut self) {
        debug!(live = self.sessions.len(), "Session reaper finished");
    }
}

/// Tokio task driving one [`Housekeeper`].
pub struct HousekeepingWorker {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HousekeepingWorker {
    /// Spawns the worker. The first sweep happens one `period` after start.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<H: Housekeeper>(mut housekeeper: H, period: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = timer.tick() => housekeeper.sweep().await,
                }
            }

            housekeeper.finish().await;
        });

        Self {
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Signals the worker and waits for its final pass. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
