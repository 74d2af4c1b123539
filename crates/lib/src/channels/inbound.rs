//! Inbound message from a channel: delivered to the relay for admission and reply.

use std::fmt;

/// What a delivered message carries. Only `Text` is eligible for relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    /// Bot command such as `/start` or `/help@FractiseBot`.
    Command,
    /// Stickers, photos, joins, and anything else without plain text.
    Other,
}

/// A message from a channel, created once per delivery event and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub sender_display_name: String,
    pub text: String,
    pub kind: MessageKind,
}

impl InboundMessage {
    /// Plain text message; handy for adapters and tests.
    pub fn text(
        conversation_id: ConversationId,
        sender_display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender_display_name: sender_display_name.into(),
            text: text.into(),
            kind: MessageKind::Text,
        }
    }
}

/// Telegram conversation identity: a numeric chat id or a public `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationId {
    Numeric(i64),
    Username(String),
}

impl ConversationId {
    /// Parse a configured identifier. Accepts `-1001234567890` or `@fractise_community`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("conversation id is empty".to_string());
        }
        if let Some(name) = s.strip_prefix('@') {
            let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_chars || !(5..=32).contains(&name.len()) {
                return Err(format!(
                    "invalid username {:?}: expected @ followed by 5-32 letters, digits or underscores",
                    s
                ));
            }
            return Ok(Self::Username(s.to_string()));
        }
        s.parse::<i64>()
            .map(Self::Numeric)
            .map_err(|_| format!("invalid conversation id {:?}: expected an integer or @username", s))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{}", id),
            Self::Username(name) => f.write_str(name),
        }
    }
}
