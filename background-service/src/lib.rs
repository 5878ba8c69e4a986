//! Long-running side of the monitor: the scan loop, the operator command
//! listener and the state they share.

pub mod commands;
pub mod format;
pub mod scheduler;
pub mod service;

use chrono::NaiveDate;
use monitor_core::{AlertSink, CoreError, RetryExecutor};
use state_store::{ControlStore, DedupStore, StatePaths, StatsTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

pub use commands::CommandHandler;
pub use scheduler::{Scheduler, TickSummary};
pub use service::MonitorService;

/// Stores shared by the scan loop and the command handler. Each store has
/// its own lock; no code path holds two of them at once.
#[derive(Clone)]
pub struct SharedState {
    pub dedup: Arc<Mutex<DedupStore>>,
    pub control: Arc<Mutex<ControlStore>>,
    pub stats: Arc<Mutex<StatsTracker>>,
    /// Cuts the scheduler's wait short
    pub wake: Arc<Notify>,
}

impl SharedState {
    pub fn new(dedup: DedupStore, control: ControlStore, stats: StatsTracker) -> Self {
        Self {
            dedup: Arc::new(Mutex::new(dedup)),
            control: Arc::new(Mutex::new(control)),
            stats: Arc::new(Mutex::new(stats)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn open(paths: &StatePaths, today: NaiveDate) -> Self {
        Self::new(
            DedupStore::open(paths.seen()),
            ControlStore::open(paths.control()),
            StatsTracker::open(paths.dir(), today),
        )
    }
}

/// Send one message with a per-attempt timeout, retried by `retry`.
pub async fn deliver(
    sink: &dyn AlertSink,
    retry: &RetryExecutor,
    timeout: Duration,
    operation: &str,
    text: &str,
) -> Result<(), CoreError> {
    retry
        .execute(operation, || async move {
            match tokio::time::timeout(timeout, sink.send(text)).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::Timeout {
                    seconds: timeout.as_secs(),
                }),
            }
        })
        .await
}
