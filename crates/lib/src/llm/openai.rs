//! OpenAI chat completions client (also works with OpenAI-compatible servers via base URL).

use crate::llm::{ChatCompletion, ChatMessage, LlmBackend, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Client for POST {base_url}/chat/completions with bearer auth.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmBackend for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api(format!("{} {}", status, api_error_message(&text))));
        }
        parse_chat_response(&text)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Prefer the `error.message` field of an OpenAI error body; fall back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Choices without message content (e.g. refusals or tool-only turns) are dropped.
fn parse_chat_response(body: &str) -> Result<ChatCompletion, LlmError> {
    let data: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
    let choices = data
        .choices
        .into_iter()
        .filter_map(|c| c.message.and_then(|m| m.content))
        .collect();
    Ok(ChatCompletion { choices })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_roles_in_order() {
        let messages = vec![
            ChatMessage::system("You are FractiseBot."),
            ChatMessage::user("What is Fractise?"),
        ];
        let body = serde_json::to_value(ChatRequest {
            model: "gpt-4o",
            messages: &messages,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are FractiseBot."},
                    {"role": "user", "content": "What is Fractise?"}
                ]
            })
        );
    }

    #[test]
    fn response_keeps_choice_order() {
        let completion = parse_chat_response(
            r#"{"id": "c1", "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "first"}},
                {"index": 1, "message": {"role": "assistant", "content": "second"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(completion.first(), Some("first"));
        assert_eq!(completion.choices.len(), 2);
    }

    #[test]
    fn response_with_no_choices_is_empty() {
        let completion = parse_chat_response(r#"{"id": "c2", "choices": []}"#).unwrap();
        assert_eq!(completion.first(), None);
    }

    #[test]
    fn malformed_response_is_decode_error() {
        let err = parse_chat_response("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)));
    }

    #[test]
    fn error_body_message_is_extracted() {
        let msg = api_error_message(
            r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#,
        );
        assert_eq!(msg, "Rate limit reached");
        assert_eq!(api_error_message("  upstream down \n"), "upstream down");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OpenAiClient::new(Some("http://localhost:1234/v1/".into()), "k", "m");
        assert_eq!(client.base_url, "http://localhost:1234/v1");
        assert_eq!(client.model(), "m");
    }
}
