//! Fakes for the outbound channel and the LLM backend used by unit tests.

use crate::channels::{ChannelError, ChannelHandle, ConversationId};
use crate::llm::{ChatCompletion, ChatMessage, LlmBackend, LlmError, Role};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply(String),
    /// Reply with `echo: <last user message>`.
    Echo,
    Empty,
    Fail(String),
}

pub(crate) struct FakeBackend {
    script: Script,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeBackend {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for FakeBackend {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script {
            Script::Reply(ref text) => Ok(ChatCompletion {
                choices: vec![text.clone()],
            }),
            Script::Echo => {
                let user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Ok(ChatCompletion {
                    choices: vec![format!("echo: {}", user)],
                })
            }
            Script::Empty => Ok(ChatCompletion::default()),
            Script::Fail(ref reason) => Err(LlmError::Api(reason.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub conversation_id: ConversationId,
    pub text: String,
    pub at: Instant,
}

/// Records every send. Can fail the first N sends and cancel a token after M attempts.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    attempts: AtomicUsize,
    fail_first: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub(crate) fn cancel_after(mut self, attempts: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((attempts, token));
        self
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelHandle for RecordingChannel {
    async fn send_message(&self, conversation_id: &ConversationId, text: &str) -> Result<(), ChannelError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, ref token)) = self.cancel_after {
            if attempt >= limit {
                token.cancel();
            }
        }
        if attempt <= self.fail_first {
            return Err(ChannelError::Api(format!("send {} refused", attempt)));
        }
        self.sent.lock().unwrap().push(Sent {
            conversation_id: conversation_id.clone(),
            text: text.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}
