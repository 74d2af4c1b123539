//! Outbound capability shared by the inbound relay and the broadcaster.

use crate::channels::ConversationId;
use async_trait::async_trait;

/// Failure to deliver a message to the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("channel request failed: {0}")]
    Request(reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// Handle to a running channel. Implementations must tolerate concurrent `send_message` calls
/// from the relay lanes and the broadcaster.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Stop the channel connector. Default is a no-op for send-only channels.
    fn stop(&self) {}

    /// Send a text message to a conversation. Fire-and-forget: nothing is retained on success.
    async fn send_message(&self, conversation_id: &ConversationId, text: &str) -> Result<(), ChannelError>;
}
