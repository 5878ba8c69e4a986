//! Operator command handling: run/pause transitions and report mode.

use crate::format::{format_help, format_report, format_status, format_usage_hint, StatusView};
use crate::SharedState;
use chrono::Local;
use matcher::KeywordSet;
use monitor_core::{Command, ErrorExt, ReportMode, RunState};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct CommandHandler {
    shared: SharedState,
    keywords: Arc<KeywordSet>,
    report_top_n: usize,
}

impl CommandHandler {
    pub fn new(shared: SharedState, keywords: Arc<KeywordSet>, report_top_n: usize) -> Self {
        Self {
            shared,
            keywords,
            report_top_n,
        }
    }

    /// Apply one command and return the replies to send, in order.
    /// Unknown input gets a usage hint and changes nothing.
    pub async fn handle(&self, text: &str) -> Vec<String> {
        let command = Command::parse(text);
        info!(command = command.name(), "Processing operator command");

        match command {
            Command::Start => {
                let changed = self.set_running(true, "start").await;
                let confirmation = if changed {
                    self.shared.wake.notify_one();
                    format!(
                        "✅ *Monitoring Started*\n\nYou'll receive real\\-time alerts again\\.\n\nStarted at: {}",
                        Local::now().format("%Y\\-%m\\-%d %H:%M")
                    )
                } else {
                    "⚠️ *Monitor is already running*".to_string()
                };
                vec![confirmation, self.report(None).await]
            }
            Command::Stop => {
                let reply = if self.set_running(false, "stop").await {
                    format!(
                        "⏸️ *Monitoring Stopped*\n\nNo new alerts will be sent\\.\n\nStopped at: {}\n\nSend /start to resume monitoring\\.",
                        Local::now().format("%Y\\-%m\\-%d %H:%M")
                    )
                } else {
                    "⚠️ *Monitor is already stopped*".to_string()
                };
                vec![reply]
            }
            Command::Status => vec![format_status(&self.status().await)],
            Command::India => vec![self.switch_mode(ReportMode::India, "india").await],
            Command::Global => vec![self.switch_mode(ReportMode::Global, "global").await],
            Command::Help => vec![format_help()],
            Command::Unknown(raw) => vec![format_usage_hint(&raw)],
        }
    }

    async fn set_running(&self, running: bool, command: &str) -> bool {
        let mut control = self.shared.control.lock().await;
        match control.set_running(running, command) {
            Ok(changed) => changed,
            Err(e) => {
                // Only a real transition writes, and the in-memory flag has already moved
                e.log_warn();
                true
            }
        }
    }

    async fn switch_mode(&self, mode: ReportMode, command: &str) -> String {
        {
            let mut control = self.shared.control.lock().await;
            if let Err(e) = control.set_report_mode(mode, command) {
                e.log_warn();
            }
        }
        self.report(Some(mode)).await
    }

    /// Today's report in `mode`, or in the stored mode when `None`.
    pub async fn report(&self, mode: Option<ReportMode>) -> String {
        let mode = match mode {
            Some(mode) => mode,
            None => self.shared.control.lock().await.report_mode(),
        };
        let data = self.shared.stats.lock().await.report(mode, self.report_top_n);
        format_report(&data, Local::now())
    }

    pub async fn status(&self) -> StatusView {
        let (run_state, mode, uptime, last_command) = {
            let control = self.shared.control.lock().await;
            (
                control.state().run_state(),
                control.report_mode(),
                control.uptime(),
                control.state().last_command.clone(),
            )
        };
        let matches_today = self.shared.stats.lock().await.current().total_matches;
        let seen_posts = self.shared.dedup.lock().await.len();

        StatusView {
            run_state,
            mode,
            uptime,
            last_command,
            matches_today,
            seen_posts,
            primary_keywords: self.keywords.primary().len(),
            secondary_keywords: self.keywords.secondary().len(),
            windows: self.keywords.window_count(),
        }
    }

    pub async fn run_state(&self) -> RunState {
        self.shared.control.lock().await.state().run_state()
    }
}
