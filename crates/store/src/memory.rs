use {async_trait::async_trait, tokio::sync::Mutex};

use chatcast_protocol::ChatMessage;

use crate::store::MessageStore;

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: &ChatMessage) -> anyhow::Result<()> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<ChatMessage>> {
        let messages = self.messages.lock().await;
        Ok(messages.iter().rev().take(limit).cloned().collect())
    }
}
