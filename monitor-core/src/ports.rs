//! Boundaries to the outside world. The scan loop and command handler only
//! see these traits; the Reddit and Telegram crates implement them.

use crate::{CoreError, InboundCommand, Post};
use async_trait::async_trait;
use tracing::info;

/// Source of candidate posts for a batch of keywords.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// May return an empty list. Errors are reported, never fatal.
    async fn fetch_new_posts(&self, keywords: &[String]) -> Result<Vec<Post>, CoreError>;
}

/// Destination for formatted alert and reply text.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), CoreError>;
}

/// Inbound operator commands. `poll` may block for a long-poll window.
#[async_trait]
pub trait CommandSource: Send + Sync {
    async fn poll(&self) -> Result<Vec<InboundCommand>, CoreError>;
}

/// Sink used when no chat credentials are configured: alerts go to the log.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, message: &str) -> Result<(), CoreError> {
        let preview: String = message.chars().take(120).collect();
        info!(message = %preview, "Alert (chat delivery disabled)");
        Ok(())
    }
}
