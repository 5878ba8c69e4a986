use crate::persist::{load_or_default, save_json};
use chrono::{DateTime, Utc};
use monitor_core::{ReportMode, RunState, StateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlState {
    pub running: bool,
    pub report_mode: ReportMode,
    pub last_command: Option<String>,
    pub last_command_at: Option<DateTime<Utc>>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            running: true,
            report_mode: ReportMode::Global,
            last_command: None,
            last_command_at: None,
        }
    }
}

impl ControlState {
    pub fn run_state(&self) -> RunState {
        if self.running {
            RunState::Running
        } else {
            RunState::Paused
        }
    }
}

/// Run/pause flag and report mode, written to disk on every transition.
#[derive(Debug)]
pub struct ControlStore {
    path: PathBuf,
    state: ControlState,
    started_at: DateTime<Utc>,
}

impl ControlStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state: ControlState = load_or_default(&path);
        info!(
            running = state.running,
            mode = %state.report_mode,
            "Loaded control state"
        );
        Self {
            path,
            state,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn report_mode(&self) -> ReportMode {
        self.state.report_mode
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Returns whether the flag changed. Repeating the current value is a no-op.
    pub fn set_running(&mut self, running: bool, command: &str) -> Result<bool, StateError> {
        self.note_command(command);
        if self.state.running == running {
            return Ok(false);
        }
        self.state.running = running;
        info!(state = %self.state.run_state(), command, "Run state changed");
        self.persist()?;
        Ok(true)
    }

    pub fn set_report_mode(&mut self, mode: ReportMode, command: &str) -> Result<bool, StateError> {
        self.note_command(command);
        if self.state.report_mode == mode {
            return Ok(false);
        }
        self.state.report_mode = mode;
        info!(mode = %mode, command, "Report mode changed");
        self.persist()?;
        Ok(true)
    }

    /// Remember the latest command without writing; the next transition persists it.
    pub fn note_command(&mut self, command: &str) {
        self.state.last_command = Some(command.to_string());
        self.state.last_command_at = Some(Utc::now());
    }

    fn persist(&self) -> Result<(), StateError> {
        save_json(&self.path, &self.state)
    }
}
