use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::ScoutResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunk, ToolDef};

/// Unified LLM provider trait. All providers implement this trait, and the
/// capture pipeline and chat agent only ever see it, so tests can substitute
/// a fake model client.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Runs one chat completion. When `sink` is given and `cfg.stream` is
    /// set, chunks are forwarded to it as they arrive; the accumulated
    /// response is returned either way.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
        sink: Option<mpsc::Sender<StreamChunk>>,
    ) -> ScoutResult<LlmResponse>;
}
