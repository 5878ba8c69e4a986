//! Flat-file state that must survive a restart: seen post ids, the
//! run/pause flag with report mode, and the current day's counters.
//!
//! Each store owns one JSON file and rewrites it after every mutation.
//! Unreadable files are treated as absent.

pub mod control;
pub mod dedup;
pub mod persist;
pub mod stats;

pub use control::{ControlState, ControlStore};
pub use dedup::DedupStore;
pub use stats::{DailyStats, FilterReason, ReportData, StatsTracker};

use std::path::{Path, PathBuf};

pub const SEEN_FILE: &str = "monitor_state.json";
pub const CONTROL_FILE: &str = "monitor_control.json";
pub const STATS_FILE: &str = "daily_stats.json";

/// Paths of the state files inside one directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub dir: PathBuf,
}

impl StatePaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn seen(&self) -> PathBuf {
        self.dir.join(SEEN_FILE)
    }

    pub fn control(&self) -> PathBuf {
        self.dir.join(CONTROL_FILE)
    }

    pub fn stats(&self) -> PathBuf {
        self.dir.join(STATS_FILE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
