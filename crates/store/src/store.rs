/// Storage abstraction for chat messages.
use async_trait::async_trait;

use chatcast_protocol::ChatMessage;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to the log.
    async fn append(&self, message: &ChatMessage) -> anyhow::Result<()>;

    /// Up to `limit` messages, newest first.
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<ChatMessage>>;
}
