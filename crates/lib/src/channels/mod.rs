//! Communication channels (e.g. Telegram).
//!
//! The outbound `ChannelHandle` capability is shared by the relay and the broadcaster.
//! Inbound messages are pushed into an mpsc channel consumed by the service dispatcher.

mod handle;
mod inbound;
mod telegram;

pub use handle::{ChannelError, ChannelHandle};
pub use inbound::{ConversationId, InboundMessage, MessageKind};
pub use telegram::{telegram_api_base, TelegramChannel, TelegramMessage, TelegramUpdate};
