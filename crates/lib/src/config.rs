//! Configuration types and loading.
//!
//! Settings come from environment variables first, then an optional JSON file
//! (e.g. `~/.fractise-relay/config.json`), then built-in defaults. The result is resolved once
//! into an immutable [`RelayConfig`]; anything missing or malformed is a [`ConfigError`].

use crate::channels::ConversationId;
use crate::llm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PERSONA: &str =
    "You are FractiseBot, a helpful assistant for the Fractise community.";
pub const DEFAULT_FALLBACK_REPLY: &str = "Sorry, I couldn't process your request at the moment.";
pub const DEFAULT_BROADCAST_INTERVAL_SECS: u64 = 21_600;
pub const DEFAULT_BROADCAST_INITIAL_DELAY_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const ENV_API_KEY: &str = "OPENAI_API_KEY";
const ENV_MODEL: &str = "OPENAI_MODEL";
const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
const ENV_TIMEOUT: &str = "OPENAI_TIMEOUT_SECS";
const ENV_CHAT_ID: &str = "RELAY_CHAT_ID";
const ENV_PERSONA: &str = "RELAY_PERSONA";
const ENV_FALLBACK: &str = "RELAY_FALLBACK_REPLY";
const ENV_BROADCAST_ENABLED: &str = "RELAY_BROADCAST_ENABLED";
const ENV_BROADCAST_CHAT_ID: &str = "RELAY_BROADCAST_CHAT_ID";
const ENV_BROADCAST_INTERVAL: &str = "RELAY_BROADCAST_INTERVAL_SECS";
const ENV_BROADCAST_INITIAL_DELAY: &str = "RELAY_BROADCAST_INITIAL_DELAY_SECS";

/// Rotation used when the config file does not list broadcast messages.
pub fn default_broadcast_messages() -> Vec<String> {
    [
        "👋 Have a question about Fractise? Just ask here and FractiseBot will answer.",
        "📚 New to Fractise? Ask me anything about how it works.",
        "💡 Tip: you can ask FractiseBot to explain any Fractise feature in plain words.",
        "🤝 Share your ideas and feedback with the Fractise community right here.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("config file {}: {}", .path.display(), .reason)]
    File { path: PathBuf, reason: String },
}

/// On-disk config file shape (camelCase JSON). Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub telegram: TelegramFileConfig,
    #[serde(default)]
    pub openai: OpenAiFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub broadcast: BroadcastFileConfig,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramFileConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// Only this chat is relayed. Absent means every chat. Overridden by RELAY_CHAT_ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<IdValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// OpenAI-compatible base URL, e.g. `http://127.0.0.1:1234/v1` for a local server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayFileConfig {
    /// System persona. An empty string disables it (user-only prompts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reply: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastFileConfig {
    /// Defaults to on when a target conversation is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Defaults to `telegram.chatId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<IdValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<String>>,
}

/// Chat ids may be written as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
}

impl IdValue {
    fn to_raw(&self) -> String {
        match self {
            IdValue::Number(n) => n.to_string(),
            IdValue::Text(s) => s.clone(),
        }
    }
}

impl FileConfig {
    /// Starter file written by `init`: placeholders for secrets plus the default rotation.
    pub fn template() -> Self {
        Self {
            telegram: TelegramFileConfig {
                bot_token: Some(String::new()),
                chat_id: None,
            },
            openai: OpenAiFileConfig {
                api_key: Some(String::new()),
                model: Some(llm::DEFAULT_MODEL.to_string()),
                base_url: None,
                timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            relay: RelayFileConfig {
                persona: Some(DEFAULT_PERSONA.to_string()),
                fallback_reply: Some(DEFAULT_FALLBACK_REPLY.to_string()),
            },
            broadcast: BroadcastFileConfig {
                enabled: None,
                chat_id: None,
                interval_secs: Some(DEFAULT_BROADCAST_INTERVAL_SECS),
                initial_delay_secs: Some(DEFAULT_BROADCAST_INITIAL_DELAY_SECS),
                messages: Some(default_broadcast_messages()),
            },
        }
    }
}

/// Scheduled broadcast settings; present only when broadcasting is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    pub target: ConversationId,
    /// Always > 0.
    pub interval: Duration,
    pub initial_delay: Duration,
    /// Never empty.
    pub messages: Vec<String>,
}

/// Resolved relay configuration. Immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bot_token: String,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub request_timeout: Duration,
    /// Absent means all conversations are admitted.
    pub allowed_conversation_id: Option<ConversationId>,
    /// Absent means user-only prompts.
    pub persona: Option<String>,
    pub fallback_reply: String,
    pub broadcast: Option<BroadcastConfig>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_secs(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("expected a whole number of seconds, got {:?}", raw),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected true or false, got {:?}", other),
        }),
    }
}

fn parse_id(key: &'static str, raw: &str) -> Result<ConversationId, ConfigError> {
    ConversationId::parse(raw).map_err(|reason| ConfigError::Invalid { key, reason })
}

impl RelayConfig {
    /// Resolve from the process environment and the given file config.
    pub fn resolve(file: &FileConfig) -> Result<Self, ConfigError> {
        Self::resolve_with(file, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup (tests pass a map instead of touching the process env).
    pub fn resolve_with<F>(file: &FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = non_blank(env(ENV_BOT_TOKEN)).or_else(|| non_blank(file.telegram.bot_token.clone()));
        let api_key = non_blank(env(ENV_API_KEY)).or_else(|| non_blank(file.openai.api_key.clone()));
        let mut missing = Vec::new();
        if bot_token.is_none() {
            missing.push(ENV_BOT_TOKEN);
        }
        if api_key.is_none() {
            missing.push(ENV_API_KEY);
        }
        let (Some(bot_token), Some(api_key)) = (bot_token, api_key) else {
            return Err(ConfigError::Missing(missing));
        };

        let model = non_blank(env(ENV_MODEL))
            .or_else(|| non_blank(file.openai.model.clone()))
            .unwrap_or_else(|| llm::DEFAULT_MODEL.to_string());
        let base_url = non_blank(env(ENV_BASE_URL)).or_else(|| non_blank(file.openai.base_url.clone()));
        let timeout_secs = match non_blank(env(ENV_TIMEOUT)) {
            Some(raw) => parse_secs(ENV_TIMEOUT, &raw)?,
            None => file.openai.timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_TIMEOUT,
                reason: "must be greater than zero".to_string(),
            });
        }

        let allowed_conversation_id = match non_blank(env(ENV_CHAT_ID))
            .or_else(|| file.telegram.chat_id.as_ref().map(IdValue::to_raw))
        {
            Some(raw) => {
                let id = parse_id(ENV_CHAT_ID, &raw)?;
                if !id.is_numeric() {
                    return Err(ConfigError::Invalid {
                        key: ENV_CHAT_ID,
                        reason: "inbound chats are identified numerically; use the numeric chat id".to_string(),
                    });
                }
                Some(id)
            }
            None => None,
        };

        let persona = match env(ENV_PERSONA).or_else(|| file.relay.persona.clone()) {
            Some(p) => non_blank(Some(p)),
            None => Some(DEFAULT_PERSONA.to_string()),
        };
        let fallback_reply = non_blank(env(ENV_FALLBACK))
            .or_else(|| non_blank(file.relay.fallback_reply.clone()))
            .unwrap_or_else(|| DEFAULT_FALLBACK_REPLY.to_string());

        let broadcast = resolve_broadcast(&file.broadcast, allowed_conversation_id.as_ref(), &env)?;

        Ok(Self {
            bot_token,
            api_key,
            model,
            base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            allowed_conversation_id,
            persona,
            fallback_reply,
            broadcast,
        })
    }

    /// Human-readable summary with secrets redacted.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("telegram bot token: {}", redact(&self.bot_token)),
            format!("openai api key: {}", redact(&self.api_key)),
            format!(
                "model: {} ({})",
                self.model,
                self.base_url.as_deref().unwrap_or(llm::DEFAULT_BASE_URL)
            ),
            format!("request timeout: {}s", self.request_timeout.as_secs()),
            format!(
                "allowed conversation: {}",
                self.allowed_conversation_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "all".to_string())
            ),
            format!(
                "persona: {}",
                self.persona.as_deref().unwrap_or("(none, user-only prompts)")
            ),
        ];
        match self.broadcast {
            Some(ref b) => lines.push(format!(
                "broadcast: every {}s to {} ({} messages, first after {}s)",
                b.interval.as_secs(),
                b.target,
                b.messages.len(),
                b.initial_delay.as_secs()
            )),
            None => lines.push("broadcast: disabled".to_string()),
        }
        lines.join("\n")
    }
}

fn resolve_broadcast<F>(
    file: &BroadcastFileConfig,
    allowed: Option<&ConversationId>,
    env: &F,
) -> Result<Option<BroadcastConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = match non_blank(env(ENV_BROADCAST_ENABLED)) {
        Some(raw) => Some(parse_bool(ENV_BROADCAST_ENABLED, &raw)?),
        None => file.enabled,
    };
    if enabled == Some(false) {
        return Ok(None);
    }
    let target = match non_blank(env(ENV_BROADCAST_CHAT_ID))
        .or_else(|| file.chat_id.as_ref().map(IdValue::to_raw))
    {
        Some(raw) => Some(parse_id(ENV_BROADCAST_CHAT_ID, &raw)?),
        None => allowed.cloned(),
    };
    let Some(target) = target else {
        if enabled == Some(true) {
            return Err(ConfigError::Invalid {
                key: ENV_BROADCAST_CHAT_ID,
                reason: "broadcasting is enabled but no target conversation is configured".to_string(),
            });
        }
        log::debug!("broadcast disabled: no target conversation configured");
        return Ok(None);
    };

    let interval_secs = match non_blank(env(ENV_BROADCAST_INTERVAL)) {
        Some(raw) => parse_secs(ENV_BROADCAST_INTERVAL, &raw)?,
        None => file.interval_secs.unwrap_or(DEFAULT_BROADCAST_INTERVAL_SECS),
    };
    if interval_secs == 0 {
        return Err(ConfigError::Invalid {
            key: ENV_BROADCAST_INTERVAL,
            reason: "must be greater than zero".to_string(),
        });
    }
    let initial_delay_secs = match non_blank(env(ENV_BROADCAST_INITIAL_DELAY)) {
        Some(raw) => parse_secs(ENV_BROADCAST_INITIAL_DELAY, &raw)?,
        None => file
            .initial_delay_secs
            .unwrap_or(DEFAULT_BROADCAST_INITIAL_DELAY_SECS),
    };
    let messages: Vec<String> = match file.messages {
        Some(ref list) => list
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
        None => default_broadcast_messages(),
    };
    if messages.is_empty() {
        return Err(ConfigError::Invalid {
            key: "broadcast.messages",
            reason: "broadcasting is enabled but the message list is empty".to_string(),
        });
    }

    Ok(Some(BroadcastConfig {
        target,
        interval: Duration::from_secs(interval_secs),
        initial_delay: Duration::from_secs(initial_delay_secs),
        messages,
    }))
}

fn redact(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{}", tail)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".fractise-relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load the config file from the given path (or the default). Missing file => default config.
/// Returns the file config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(FileConfig, PathBuf), ConfigError> {
    let path = path.unwrap_or_else(default_config_path);
    let config = read_config_file(&path)?;
    Ok((config, path))
}

fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(FileConfig::default());
    }
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        reason: format!("reading: {}", e),
    })?;
    serde_json::from_str(&s).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        reason: format!("parsing: {}", e),
    })
}
