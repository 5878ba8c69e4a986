//! Bot API payloads and error mapping.

use chrono::{TimeZone, Utc};
use monitor_core::{InboundCommand, TelegramError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    pub parse_mode: &'static str,
    pub disable_web_page_preview: bool,
}

/// Persisted polling position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetState {
    pub last_update_id: i64,
}

pub fn error_from_status(
    status: u16,
    description: Option<String>,
    retry_after: Option<u64>,
) -> TelegramError {
    match status {
        // A malformed token is reported as 404
        401 | 404 => TelegramError::Unauthorized,
        409 => TelegramError::Conflict,
        429 => TelegramError::RateLimited {
            retry_after: retry_after.unwrap_or(30),
        },
        400 | 403 => TelegramError::BadRequest {
            description: description.unwrap_or_else(|| format!("status {}", status)),
        },
        s if s >= 500 => TelegramError::ServerError { status_code: s },
        s => TelegramError::InvalidResponse {
            details: description.unwrap_or_else(|| format!("unexpected status {}", s)),
        },
    }
}

/// Keep text messages from `chat_id` and advance past every update seen,
/// including ones that are dropped.
pub fn select_commands(
    chat_id: &str,
    last_update_id: i64,
    updates: Vec<Update>,
) -> (i64, Vec<InboundCommand>) {
    let mut newest = last_update_id;
    let mut commands = Vec::new();

    for update in updates {
        if update.update_id <= last_update_id {
            continue;
        }
        newest = newest.max(update.update_id);

        let Some(message) = update.message else {
            continue;
        };
        if message.chat.id.to_string() != chat_id {
            continue;
        }
        let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
            continue;
        };

        commands.push(InboundCommand {
            text,
            received_at: Utc
                .timestamp_opt(message.date, 0)
                .single()
                .unwrap_or_else(Utc::now),
        });
    }

    (newest, commands)
}
