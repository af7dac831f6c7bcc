//! Scheduler lifecycle.
//!
//! `Scheduler::start` spawns the poll loop and hands back a `SchedulerHandle`
//! that owns the shutdown signal. A cycle that is already running finishes
//! before the loop observes the stop request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;

pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(dispatcher: Dispatcher, poll_interval: Duration) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            poll_interval,
        }
    }

    /// Spawn the poll loop on the current tokio runtime.
    ///
    /// The first cycle runs immediately, then one cycle every `poll_interval`
    /// measured from the end of the previous cycle.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Message scheduler started"
        );

        let task = tokio::spawn(run_loop(self.dispatcher, self.poll_interval, shutdown_rx));

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) -> anyhow::Result<()> {
        // The receiver is gone only if the loop already exited.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| anyhow::anyhow!("Scheduler task failed: {}", e))?;

        tracing::info!("Message scheduler stopped");
        Ok(())
    }
}

async fn run_loop(
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match dispatcher.run_cycle(Utc::now()).await {
            Ok(summary) if summary.selected > 0 => {
                tracing::info!(
                    selected = summary.selected,
                    sent = summary.sent,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Poll cycle complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                // Store unavailable; try again next cycle
                tracing::error!(error = %e, "Failed to query due messages");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
