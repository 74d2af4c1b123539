//! Admission: which inbound messages are relayed at all.

use crate::channels::{ConversationId, InboundMessage, MessageKind};

/// Pure admission predicate over conversation identity and content kind.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    allowed_conversation_id: Option<ConversationId>,
}

impl ChannelFilter {
    /// `None` admits every conversation.
    pub fn new(allowed_conversation_id: Option<ConversationId>) -> Self {
        Self {
            allowed_conversation_id,
        }
    }

    pub fn accept(&self, msg: &InboundMessage) -> bool {
        if let Some(ref allowed) = self.allowed_conversation_id {
            if msg.conversation_id != *allowed {
                return false;
            }
        }
        msg.kind == MessageKind::Text && !msg.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(chat: i64, body: &str) -> InboundMessage {
        InboundMessage::text(ConversationId::Numeric(chat), "ada", body)
    }

    #[test]
    fn allowed_conversation_only() {
        let filter = ChannelFilter::new(Some(ConversationId::Numeric(42)));
        assert!(filter.accept(&text(42, "What is Fractise?")));
        assert!(!filter.accept(&text(99, "What is Fractise?")));
    }

    #[test]
    fn no_allowed_conversation_admits_all() {
        let filter = ChannelFilter::default();
        assert!(filter.accept(&text(1, "hi")));
        assert!(filter.accept(&text(-1001234567890, "hi")));
    }

    #[test]
    fn blank_text_is_rejected() {
        let filter = ChannelFilter::default();
        assert!(!filter.accept(&text(42, "")));
        assert!(!filter.accept(&text(42, " \n\t ")));
    }

    #[test]
    fn non_text_kinds_are_rejected() {
        let filter = ChannelFilter::new(Some(ConversationId::Numeric(42)));
        let mut cmd = text(42, "/start");
        cmd.kind = MessageKind::Command;
        assert!(!filter.accept(&cmd));
        let mut other = text(42, "caption");
        other.kind = MessageKind::Other;
        assert!(!filter.accept(&other));
    }
}
