//! LLM abstraction and OpenAI-compatible client.
//!
//! The relay only needs single-shot, non-streaming chat completions: one request, all choices back.

mod openai;

pub use openai::{OpenAiClient, DEFAULT_BASE_URL, DEFAULT_MODEL};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Completion texts in the order the backend returned them. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCompletion {
    pub choices: Vec<String>,
}

impl ChatCompletion {
    pub fn first(&self) -> Option<&str> {
        self.choices.first().map(String::as_str)
    }
}

/// Generative backend capability. One call is one network request; retries are the caller's business.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, LlmError>;
}
