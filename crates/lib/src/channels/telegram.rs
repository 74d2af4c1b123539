//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::channels::handle::{ChannelError, ChannelHandle};
use crate::channels::inbound::{ConversationId, InboundMessage, MessageKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(2);
/// sendMessage rejects longer texts.
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<TelegramUser>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<TelegramEntity>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramEntity {
    #[serde(rename = "type")]
    pub typ: String,
    pub offset: usize,
}

impl TelegramMessage {
    /// Convert to the platform-neutral inbound shape. Non-text messages come through as `Other` with empty text.
    pub fn to_inbound(&self) -> InboundMessage {
        let text = self.text.clone().unwrap_or_default();
        let kind = if self.text.is_none() {
            MessageKind::Other
        } else if text.starts_with('/')
            || self
                .entities
                .iter()
                .any(|e| e.typ == "bot_command" && e.offset == 0)
        {
            MessageKind::Command
        } else {
            MessageKind::Text
        };
        InboundMessage {
            conversation_id: ConversationId::Numeric(self.chat.id),
            sender_display_name: self.from.as_ref().map(display_name).unwrap_or_default(),
            text,
            kind,
        }
    }
}

fn display_name(user: &TelegramUser) -> String {
    if let Some(ref username) = user.username {
        return format!("@{}", username);
    }
    match user.last_name {
        Some(ref last) if !last.is_empty() => format!("{} {}", user.first_name, last),
        _ => user.first_name.clone(),
    }
}

fn chat_id_value(id: &ConversationId) -> serde_json::Value {
    match id {
        ConversationId::Numeric(n) => serde_json::Value::from(*n),
        ConversationId::Username(name) => serde_json::Value::String(name.clone()),
    }
}

/// Split `text` into pieces of at most `max_chars` characters, breaking after the last newline
/// in each window when there is one.
fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some((cut, _)) = rest.char_indices().nth(max_chars) {
        let at = match rest[..cut].rfind('\n') {
            Some(i) if i > 0 => i + 1,
            _ => cut,
        };
        chunks.push(&rest[..at]);
        rest = &rest[at..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// The request URL carries the bot token, so it is stripped before the error can reach a log line.
fn transport(e: reqwest::Error) -> ChannelError {
    ChannelError::Request(e.without_url())
}

/// Telegram channel connector: long-polls for updates and sends messages via sendMessage.
pub struct TelegramChannel {
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            token,
            api_base: api_base.into(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, ChannelError> {
        let token = self
            .token
            .as_ref()
            .ok_or(ChannelError::NotConfigured("telegram bot token"))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Start the getUpdates long-poll loop and forward messages to the relay. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let url = format!("{}?timeout={}", self.method_url("getUpdates")?, LONG_POLL_TIMEOUT);
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let res = self.client.get(&url).send().await.map_err(transport)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("getUpdates failed: {} {}", status, body)));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(transport)?;
        if !data.ok {
            return Err(ChannelError::Api(format!(
                "getUpdates returned ok: false ({})",
                data.description.unwrap_or_default()
            )));
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1)
            .or(offset);
        Ok((data.result, next_offset))
    }

    /// Call getMe to check the token. Returns the bot's username.
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        let url = self.method_url("getMe")?;
        let res = self.client.get(&url).send().await.map_err(transport)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("getMe failed: {} {}", status, body)));
        }
        let data: GetMeResponse = res.json().await.map_err(transport)?;
        match data.result {
            Some(user) if data.ok => Ok(user.username.unwrap_or(user.first_name)),
            _ => Err(ChannelError::Api(format!(
                "getMe returned ok: false ({})",
                data.description.unwrap_or_default()
            ))),
        }
    }

    /// Send a text message to a chat via sendMessage API. Texts over 4096 characters go out as
    /// several messages, in order; the first failed part ends the send.
    pub async fn send_message(&self, chat_id: &ConversationId, text: &str) -> Result<(), ChannelError> {
        let url = self.method_url("sendMessage")?;
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_chunk(&url, chat_id, chunk).await?;
        }
        Ok(())
    }

    async fn send_chunk(&self, url: &str, chat_id: &ConversationId, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": chat_id_value(chat_id), "text": text });
        let res = self.client.post(url).json(&body).send().await.map_err(transport)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("sendMessage failed: {} {}", status, body)));
        }
        let data: SendMessageResponse = res.json().await.map_err(transport)?;
        if !data.ok {
            return Err(ChannelError::Api(format!(
                "sendMessage returned ok: false ({})",
                data.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next;
                for u in updates {
                    let Some(ref msg) = u.message else { continue };
                    if inbound_tx.send(msg.to_inbound()).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, conversation_id: &ConversationId, text: &str) -> Result<(), ChannelError> {
        TelegramChannel::send_message(self, conversation_id, text).await
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .ok()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
}
