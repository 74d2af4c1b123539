//! One generative-backend call per inbound message, with a timeout and no error escaping.

use crate::llm::{ChatMessage, LlmBackend, LlmError};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one generation. Failures carry a reason for logs only; it is never shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Ok(String),
    Failed(String),
}

#[derive(Clone)]
pub struct ResponseGenerator {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Persona as system context, then the user text. No persona means a user-only prompt.
    pub fn build_messages(user_text: &str, persona: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(p) = persona.map(str::trim).filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::system(p));
        }
        messages.push(ChatMessage::user(user_text));
        messages
    }

    /// Calls the backend exactly once. Never retries.
    pub async fn generate(&self, user_text: &str, persona: Option<&str>) -> GenerationResult {
        let messages = Self::build_messages(user_text, persona);
        let res = match tokio::time::timeout(self.timeout, self.backend.chat(&messages)).await {
            Ok(res) => res,
            Err(_) => Err(LlmError::Timeout(self.timeout)),
        };
        match res {
            Ok(completion) => match completion.first() {
                Some(text) => GenerationResult::Ok(text.to_string()),
                None => {
                    log::warn!("generation failed: empty completion");
                    GenerationResult::Failed("empty completion".to_string())
                }
            },
            Err(e) => {
                log::warn!("generation failed: {}", e);
                GenerationResult::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::testing::{FakeBackend, Script};

    fn generator(backend: Arc<FakeBackend>) -> ResponseGenerator {
        ResponseGenerator::new(backend, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn persona_and_user_text_form_two_roles() {
        let backend = Arc::new(FakeBackend::new(Script::Reply("Fractise is a community.".into())));
        let result = generator(backend.clone())
            .generate("What is Fractise?", Some("You are FractiseBot."))
            .await;
        assert_eq!(result, GenerationResult::Ok("Fractise is a community.".into()));
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![
                ChatMessage::system("You are FractiseBot."),
                ChatMessage::user("What is Fractise?"),
            ]
        );
    }

    #[tokio::test]
    async fn absent_persona_sends_user_only() {
        let backend = Arc::new(FakeBackend::new(Script::Echo));
        let result = generator(backend.clone()).generate("hello", None).await;
        assert_eq!(result, GenerationResult::Ok("echo: hello".into()));
        let calls = backend.calls();
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[0][0].role, Role::User);
    }

    #[test]
    fn blank_persona_is_treated_as_absent() {
        let messages = ResponseGenerator::build_messages("hi", Some("   "));
        assert_eq!(messages, vec![ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn backend_error_becomes_failed() {
        let backend = Arc::new(FakeBackend::new(Script::Fail("429 rate limited".into())));
        let result = generator(backend.clone()).generate("hi", None).await;
        match result {
            GenerationResult::Failed(reason) => assert!(reason.contains("429 rate limited")),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(backend.calls().len(), 1, "no internal retry");
    }

    #[tokio::test]
    async fn zero_completions_is_failed() {
        let backend = Arc::new(FakeBackend::new(Script::Empty));
        let result = generator(backend).generate("hi", None).await;
        assert_eq!(result, GenerationResult::Failed("empty completion".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let backend = Arc::new(
            FakeBackend::new(Script::Reply("too late".into())).with_delay(Duration::from_secs(120)),
        );
        let result = ResponseGenerator::new(backend, Duration::from_secs(10))
            .generate("hi", None)
            .await;
        match result {
            GenerationResult::Failed(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
