use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;

/// Incremental text deltas produced by a streaming completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single system-plus-prompt completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat-style language model used for report generation and the assistant.
///
/// Built once at startup and shared as `Arc<dyn CompletionBackend>`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Start a streaming completion. Errors before the first delta (bad
    /// credentials, unreachable host) are returned directly; later failures
    /// surface as `Err` items in the stream.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<TokenStream>;

    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Answer the last user message given the preceding history.
    async fn chat(&self, system: &str, messages: &[ChatMessage]) -> Result<String>;
}
