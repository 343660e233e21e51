//! Periodic sweeps over the in-memory tables.
//!
//! Every table gets its own task; tasks stop when the owning [`Sweeper`] is
//! shut down so nothing keeps running past server teardown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// A table that can drop its expired entries.
pub trait Sweep: Send + Sync {
    /// Remove expired entries, returning how many were dropped.
    fn sweep(&self) -> usize;
}

pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Sweeper {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Sweep `table` every `every` until shutdown.
    ///
    /// The first sweep runs one full period after spawning.
    pub fn spawn(&mut self, name: &'static str, every: Duration, table: Arc<dyn Sweep>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = table.sweep();
                        if removed > 0 {
                            debug!(table = name, removed, "Swept expired entries");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(table = name, "Sweep task stopped");
        });

        self.tasks.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every task and wait for all of them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                debug!(table = name, "Sweep task ended abnormally: {}", e);
            }
        }

        info!("Background sweeps stopped");
    }
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new()
    }
}
