//! Telegram Bot API client: alert sink and operator command source.

pub mod api;

use api::{error_from_status, select_commands, ApiResponse, OffsetState, SendMessage, Update};
use async_trait::async_trait;
use monitor_core::{
    AlertSink, CommandSource, CoreError, InboundCommand, TelegramError, TelegramSettings,
};
use serde::de::DeserializeOwned;
use state_store::persist::{load_or_default, save_json};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const OFFSET_FILE: &str = "last_update_id.json";

pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    chat_id: String,
    poll_timeout_secs: u64,
    send_timeout: Duration,
    min_interval: Duration,
    last_send: Mutex<Option<Instant>>,
    offset: Mutex<OffsetState>,
    offset_path: PathBuf,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The base URL embeds the bot token
        f.debug_struct("TelegramClient")
            .field("chat_id", &self.chat_id)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(
        settings: &TelegramSettings,
        send_timeout: Duration,
        state_dir: &Path,
    ) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder().build()?;
        let offset_path = state_dir.join(OFFSET_FILE);
        let offset: OffsetState = load_or_default(&offset_path);

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", TELEGRAM_API_BASE, settings.bot_token),
            chat_id: settings.chat_id.clone(),
            poll_timeout_secs: settings.tuning.poll_timeout_secs,
            send_timeout,
            min_interval: Duration::from_millis(settings.tuning.send_min_interval_ms),
            last_send: Mutex::new(None),
            offset: Mutex::new(offset),
            offset_path,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    pub async fn last_update_id(&self) -> i64 {
        self.offset.lock().await.last_update_id
    }

    async fn read_result<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CoreError> {
        let status = response.status().as_u16();
        let body = response.text().await?;

        let parsed: Result<ApiResponse<T>, _> = serde_json::from_str(&body);
        match parsed {
            Ok(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(api) => Err(error_from_status(
                api.error_code.unwrap_or(status),
                api.description,
                api.parameters.and_then(|p| p.retry_after),
            )
            .into()),
            Err(e) if (200..300).contains(&status) => {
                Err(TelegramError::InvalidResponse {
                    details: e.to_string(),
                }
                .into())
            }
            Err(_) => Err(error_from_status(status, None, None).into()),
        }
    }

    /// Remove any webhook and drop updates queued while the monitor was down,
    /// so long polling works and stale commands are not replayed.
    pub async fn clear_webhook(&self) -> Result<(), CoreError> {
        let response = self
            .http
            .post(self.method_url("deleteWebhook"))
            .query(&[("drop_pending_updates", "true")])
            .timeout(self.send_timeout)
            .send()
            .await?;
        let _: bool = self.read_result(response).await?;
        info!("Cleared Telegram webhook and pending updates");
        Ok(())
    }

    /// Wait out the minimum spacing between messages. Holding the lock while
    /// sleeping keeps concurrent senders in line.
    async fn throttle(&self) {
        let mut last = self.last_send.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn send_message(&self, text: &str, disable_preview: bool) -> Result<(), CoreError> {
        self.throttle().await;

        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "MarkdownV2",
            disable_web_page_preview: disable_preview,
        };
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .timeout(self.send_timeout)
            .send()
            .await?;

        let _: serde_json::Value = self.read_result(response).await?;
        debug!(chars = text.chars().count(), "Telegram message sent");
        Ok(())
    }

    async fn save_offset(&self, state: OffsetState) {
        if let Err(e) = save_json(&self.offset_path, &state) {
            warn!(error = %e, "Failed to persist Telegram update offset");
        }
    }
}

#[async_trait]
impl AlertSink for TelegramClient {
    async fn send(&self, message: &str) -> Result<(), CoreError> {
        self.send_message(message, false).await
    }
}

#[async_trait]
impl CommandSource for TelegramClient {
    /// Long-polls `getUpdates`. Blocks up to the configured poll timeout.
    async fn poll(&self) -> Result<Vec<InboundCommand>, CoreError> {
        let last_update_id = self.last_update_id().await;
        let offset = (last_update_id + 1).to_string();
        let timeout = self.poll_timeout_secs.to_string();

        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.as_str()),
                ("timeout", timeout.as_str()),
                ("allowed_updates", "[\"message\"]"),
            ])
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .send()
            .await?;

        let updates: Vec<Update> = match self.read_result(response).await {
            Ok(updates) => updates,
            Err(CoreError::Telegram(TelegramError::Conflict)) => {
                warn!("Telegram returned 409, another instance may be polling");
                return Err(TelegramError::Conflict.into());
            }
            Err(e) => return Err(e),
        };

        let (newest, commands) = select_commands(&self.chat_id, last_update_id, updates);
        if newest != last_update_id {
            let state = OffsetState {
                last_update_id: newest,
            };
            *self.offset.lock().await = state;
            self.save_offset(state).await;
        }

        if !commands.is_empty() {
            debug!(count = commands.len(), "Received operator commands");
        }
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::TelegramTuning;

    fn settings() -> TelegramSettings {
        TelegramSettings {
            bot_token: "123:secret".to_string(),
            chat_id: "-1001".to_string(),
            tuning: TelegramTuning {
                send_min_interval_ms: 50,
                poll_timeout_secs: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_offset_is_restored_from_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        save_json(
            &dir.path().join(OFFSET_FILE),
            &OffsetState {
                last_update_id: 41,
            },
        )
        .unwrap();

        let client = TelegramClient::new(&settings(), Duration::from_secs(5), dir.path()).unwrap();
        assert_eq!(client.last_update_id().await, 41);
    }

    #[tokio::test]
    async fn test_debug_output_hides_token() {
        let dir = tempfile::tempdir().unwrap();
        let client = TelegramClient::new(&settings(), Duration::from_secs(5), dir.path()).unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret"));
        assert!(client.method_url("sendMessage").ends_with("/bot123:secret/sendMessage"));
    }

    #[tokio::test]
    async fn test_throttle_spaces_sends() {
        let dir = tempfile::tempdir().unwrap();
        let client = TelegramClient::new(&settings(), Duration::from_secs(5), dir.path()).unwrap();

        let start = Instant::now();
        client.throttle().await;
        client.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
