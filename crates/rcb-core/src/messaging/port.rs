use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound channel port: sends to a chat, optionally in HTML parse mode.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send `html`, rendered as the supported markup subset.
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
}
