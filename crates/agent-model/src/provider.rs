use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::types::{FinishReason, Message};

/// A tool schema in the shape providers expect (name, description, JSON Schema
/// parameters). Intentionally duplicated rather than re-exported from the
/// tools crate so `agent-model` never depends on `agent-tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One completion request: the filtered session history plus generation
/// options. `session_id` doubles as the provider's prompt-cache key so
/// repeated calls within one session can reuse cached prefixes.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: Option<String>,
    pub stream: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
    pub session_id: String,
}

impl CompletionRequest {
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: None,
            stream: true,
            temperature: None,
            max_tokens: None,
            model: None,
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
}

/// A single streamed unit. Non-streaming providers synthesize an equivalent
/// sequence (one `ToolCallDelta`/`TextDelta` each, then `Done`) so the loop
/// engine has exactly one consumption path regardless of transport.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    TextDelta { index: u32, content: String },
    ReasoningDelta { index: u32, content: String },
    /// A fragment of a tool call under construction. `tool_index` disambiguates
    /// parallel tool calls within the same choice; `call_id`/`tool_name` are
    /// only present on the first fragment for a given `tool_index`.
    ToolCallDelta {
        index: u32,
        tool_index: u32,
        call_id: Option<String>,
        tool_name: Option<String>,
        arguments_fragment: String,
    },
    Usage(Usage),
    Done { index: u32, finish_reason: Option<FinishReason> },
    /// A streamed error chunk; the loop engine treats this exactly like a
    /// provider-raised `ProviderError::Retryable` with the same code.
    Error { code: String, message: String },
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseEvent, ProviderError>> + Send>>;

/// The interface the loop engine consumes to drive a language model.
/// Implementations own HTTP/SSE transport details entirely; this crate only
/// specifies the shape of requests and streamed responses.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<ResponseStream, ProviderError>;

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
    fn max_context_tokens(&self) -> usize {
        128_000
    }
    fn max_output_tokens(&self) -> usize {
        8_192
    }
}
