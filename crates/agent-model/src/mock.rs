use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::ProviderError;
use crate::provider::{CompletionRequest, ModelProvider, ResponseEvent, ResponseStream};
use crate::types::FinishReason;

/// One scripted outcome for a single `complete` call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// A sequence of stream events delivered successfully.
    Events(Vec<ResponseEvent>),
    /// `complete` itself fails before any stream is produced.
    Raise(ProviderError),
}

impl ScriptedResponse {
    /// A plain-text completion with `finish_reason=stop`.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Events(vec![
            ResponseEvent::TextDelta { index: 0, content: content.into() },
            ResponseEvent::Done { index: 0, finish_reason: Some(FinishReason::Stop) },
        ])
    }

    /// An empty completion (compensation-retry trigger).
    pub fn empty() -> Self {
        Self::Events(vec![ResponseEvent::Done { index: 0, finish_reason: Some(FinishReason::Stop) }])
    }

    /// A single tool call with JSON-encoded arguments.
    pub fn tool_call(call_id: impl Into<String>, tool_name: impl Into<String>, args_json: impl Into<String>) -> Self {
        Self::Events(vec![
            ResponseEvent::ToolCallDelta {
                index: 0,
                tool_index: 0,
                call_id: Some(call_id.into()),
                tool_name: Some(tool_name.into()),
                arguments_fragment: args_json.into(),
            },
            ResponseEvent::Done { index: 0, finish_reason: Some(FinishReason::ToolCalls) },
        ])
    }

    pub fn reasoning_only(content: impl Into<String>) -> Self {
        Self::Events(vec![
            ResponseEvent::ReasoningDelta { index: 0, content: content.into() },
            ResponseEvent::Done { index: 0, finish_reason: Some(FinishReason::Stop) },
        ])
    }

    pub fn stream_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Events(vec![ResponseEvent::Error { code: code.into(), message: message.into() }])
    }

    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raise(ProviderError::retryable(code, message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Raise(ProviderError::fatal(message))
    }
}

/// A deterministic provider that pops one scripted response per `complete`
/// call. Panics loudly when the script runs dry rather than silently falling
/// back, so a test under-scripting its scenario fails at the right call site.
pub struct ScriptedMockProvider {
    name: String,
    scripts: Arc<Mutex<Vec<ScriptedResponse>>>,
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    pub fn new(scripts: Vec<ScriptedResponse>) -> Self {
        Self {
            name: "scripted-mock".to_string(),
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.scripts.try_lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ResponseStream, ProviderError> {
        *self.last_request.lock().await = Some(request);
        let next = {
            let mut scripts = self.scripts.lock().await;
            if scripts.is_empty() {
                panic!("ScriptedMockProvider: no more scripted responses — under-scripted test");
            }
            scripts.remove(0)
        };
        match next {
            ScriptedResponse::Raise(e) => Err(e),
            ScriptedResponse::Events(events) => {
                let results: Vec<Result<ResponseEvent, ProviderError>> = events.into_iter().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(results)))
            }
        }
    }
}
