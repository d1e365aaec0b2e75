use async_trait::async_trait;

use crate::errors::GroundResult;
use crate::llm::types::{CallConfig, ChatMessage};

/// Unified LLM provider trait. All providers implement this trait.
/// New providers only need to implement this trait and register in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// One non-streaming chat completion; returns the assistant text.
    async fn chat(&self, messages: &[ChatMessage], cfg: &CallConfig) -> GroundResult<String>;
}
