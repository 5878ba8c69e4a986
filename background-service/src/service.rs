//! Runs the scan loop and the command listener side by side until shutdown.

use crate::commands::CommandHandler;
use crate::scheduler::Scheduler;
use crate::deliver;
use monitor_core::retry::calculate_delay;
use monitor_core::{
    AlertSink, CommandSource, CoreError, ErrorExt, RetryConfig, RetryExecutor, TelegramError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Wait after Telegram reports another poller on the same bot.
const CONFLICT_BACKOFF: Duration = Duration::from_secs(30);

pub struct MonitorService {
    scheduler: Scheduler,
    handler: CommandHandler,
    commands: Option<Arc<dyn CommandSource>>,
    sink: Arc<dyn AlertSink>,
    send_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl MonitorService {
    pub fn new(
        scheduler: Scheduler,
        handler: CommandHandler,
        commands: Option<Arc<dyn CommandSource>>,
        sink: Arc<dyn AlertSink>,
        send_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scheduler,
            handler,
            commands,
            sink,
            send_timeout,
            shutdown,
        }
    }

    /// Returns once both tasks have observed the shutdown signal.
    pub async fn run(self) -> Result<(), CoreError> {
        let scan = tokio::spawn(self.scheduler.run());

        let listener = match self.commands {
            Some(source) => Some(tokio::spawn(run_command_listener(
                source,
                self.handler,
                self.sink,
                self.send_timeout,
                self.shutdown,
            ))),
            None => {
                warn!("No command source configured, operator commands are disabled");
                None
            }
        };

        let mut result = Ok(());
        if let Err(e) = scan.await {
            error!(error = %e, "Scan loop task failed");
            result = Err(CoreError::Internal {
                message: format!("scan loop task failed: {}", e),
            });
        }
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                error!(error = %e, "Command listener task failed");
                result = Err(CoreError::Internal {
                    message: format!("command listener task failed: {}", e),
                });
            }
        }

        info!("Monitor service stopped");
        result
    }
}

/// Poll for commands, apply them, and send the replies. Poll failures back
/// off and never end the loop.
pub async fn run_command_listener(
    source: Arc<dyn CommandSource>,
    handler: CommandHandler,
    sink: Arc<dyn AlertSink>,
    send_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Command listener started");
    let backoff = RetryConfig::telegram();
    let reply_retry = RetryExecutor::new(RetryConfig::telegram());
    let mut failures = 0u32;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let polled = tokio::select! {
            polled = source.poll() => polled,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        let commands = match polled {
            Ok(commands) => {
                failures = 0;
                commands
            }
            Err(e) => {
                failures += 1;
                let delay = match &e {
                    CoreError::Telegram(TelegramError::Conflict) => {
                        warn!("Another instance is polling this bot, backing off");
                        CONFLICT_BACKOFF
                    }
                    _ => {
                        e.log_warn();
                        e.retry_after()
                            .unwrap_or_else(|| calculate_delay(failures - 1, &backoff))
                    }
                };
                debug!(failures, delay_ms = delay.as_millis() as u64, "Command poll failed");
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        for command in commands {
            for reply in handler.handle(&command.text).await {
                if let Err(e) =
                    deliver(sink.as_ref(), &reply_retry, send_timeout, "command_reply", &reply).await
                {
                    e.log_warn();
                }
            }
        }
    }

    info!("Command listener stopped");
}
