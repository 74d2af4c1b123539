//! Inbound relay: admit, generate, reply to the same conversation.

use crate::channels::{ChannelHandle, InboundMessage};
use crate::filter::ChannelFilter;
use crate::generator::{GenerationResult, ResponseGenerator};
use std::sync::Arc;

/// Handles one inbound message start to finish. Cheap to clone; lanes each hold a copy.
#[derive(Clone)]
pub struct InboundRelay {
    filter: ChannelFilter,
    generator: ResponseGenerator,
    outbound: Arc<dyn ChannelHandle>,
    persona: Option<Arc<str>>,
    fallback_reply: Arc<str>,
}

impl InboundRelay {
    pub fn new(
        filter: ChannelFilter,
        generator: ResponseGenerator,
        outbound: Arc<dyn ChannelHandle>,
        persona: Option<String>,
        fallback_reply: impl Into<String>,
    ) -> Self {
        let fallback_reply: String = fallback_reply.into();
        Self {
            filter,
            generator,
            outbound,
            persona: persona.map(Arc::from),
            fallback_reply: Arc::from(fallback_reply),
        }
    }

    /// Admission decision. Drops are logged at debug only.
    pub fn admit(&self, msg: &InboundMessage) -> bool {
        let accepted = self.filter.accept(msg);
        if !accepted {
            log::debug!(
                "admission: dropped {:?} message from {} in {}",
                msg.kind,
                msg.sender_display_name,
                msg.conversation_id
            );
        }
        accepted
    }

    /// Filtered-out messages are dropped silently. Failures end here: nothing propagates to the caller.
    pub async fn on_message(&self, msg: InboundMessage) {
        if !self.admit(&msg) {
            return;
        }
        log::debug!(
            "admission: relaying message from {} in {}",
            msg.sender_display_name,
            msg.conversation_id
        );

        let reply = match self
            .generator
            .generate(&msg.text, self.persona.as_deref())
            .await
        {
            GenerationResult::Ok(text) => text,
            GenerationResult::Failed(reason) => {
                log::warn!(
                    "relay: replying with fallback in {}: {}",
                    msg.conversation_id,
                    reason
                );
                self.fallback_reply.to_string()
            }
        };

        if let Err(e) = self.outbound.send_message(&msg.conversation_id, &reply).await {
            log::warn!("relay: send_message to {} failed: {}", msg.conversation_id, e);
        }
    }
}
