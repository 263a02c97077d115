//! Execution context for synchronous listener callbacks.
//!
//! The host application decides where ordinary (non-async) handlers run by
//! supplying a [`SyncExecutor`]. Tasks handed to one executor must run one at
//! a time in submission order.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::mpsc;
use tracing::{error, warn};

/// A unit of work queued for the host's synchronous context.
pub type SyncTask = Box<dyn FnOnce() + Send + 'static>;

/// The host's `run_sync` capability.
pub trait SyncExecutor: Send + Sync {
    fn run_sync(&self, task: SyncTask);
}

/// Default executor: a dedicated thread draining an unbounded queue.
///
/// The thread exits once the executor is dropped and the queue is empty.
pub struct QueueExecutor {
    tx: mpsc::UnboundedSender<SyncTask>,
}

impl QueueExecutor {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SyncTask>();
        let spawned = std::thread::Builder::new()
            .name("channel-sync".to_string())
            .spawn(move || {
                while let Some(task) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        warn!("Channel listener panicked");
                    }
                }
            });
        if let Err(e) = spawned {
            error!("Failed to start the channel sync thread: {e}");
        }
        Self { tx }
    }
}

impl Default for QueueExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncExecutor for QueueExecutor {
    fn run_sync(&self, task: SyncTask) {
        if self.tx.send(task).is_err() {
            warn!("Channel sync thread is gone, dropping listener task");
        }
    }
}

/// Runs every task immediately on the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl SyncExecutor for InlineExecutor {
    fn run_sync(&self, task: SyncTask) {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            warn!("Channel listener panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
