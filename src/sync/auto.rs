//! Background push queue.
//!
//! Saves queue a snapshot of the collection and move on; a worker task
//! uploads in the background. When pushes lag behind saves the queue is
//! coalesced and only the newest snapshot goes out, since every push
//! uploads the full document anyway.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::article::Article;
use crate::storage::LocalStore;
use crate::sync::config::SyncConfig;
use crate::sync::manager::{PushReport, SyncError, SyncManager};

type PushJob = Vec<Article>;

pub struct AutoSync {
    jobs: mpsc::UnboundedSender<PushJob>,
    worker: JoinHandle<Vec<Result<PushReport, SyncError>>>,
}

impl AutoSync {
    /// Spawns the worker. It owns its own copies of the sync config and the
    /// local store so gist binding changes made mid-push are persisted.
    pub fn start(manager: SyncManager, mut config: SyncConfig, local: LocalStore) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<PushJob>();
        let worker = tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(mut snapshot) = queue.recv().await {
                let mut superseded = 0usize;
                while let Ok(newer) = queue.try_recv() {
                    snapshot = newer;
                    superseded += 1;
                }
                if superseded > 0 {
                    debug!(superseded, "Coalesced queued push jobs");
                }
                let result = manager.push(&snapshot, &mut config, &local).await;
                if let Err(error) = &result {
                    warn!(error = %error, "Background push failed");
                }
                outcomes.push(result);
            }
            outcomes
        });
        Self { jobs, worker }
    }

    /// Queues a push without blocking the caller. False means the worker is
    /// gone and the snapshot was not queued.
    pub fn request(&self, snapshot: Vec<Article>) -> bool {
        self.jobs.send(snapshot).is_ok()
    }

    /// Closes the queue and waits for the worker to finish the remaining
    /// jobs, yielding every push outcome in order.
    pub async fn drain(self) -> Vec<Result<PushReport, SyncError>> {
        drop(self.jobs);
        match self.worker.await {
            Ok(outcomes) => outcomes,
            Err(error) => {
                warn!(error = %error, "Auto-sync worker did not finish cleanly");
                Vec::new()
            }
        }
    }
}
