use agent_model::{FinishReason, ProviderError, ToolCallRequest};

use crate::error::FailureCode;

/// The result of one provider turn, accumulated by the engine's stream
/// consumption loop. Carries only the facts the classifier needs — no I/O,
/// no engine state — so classification stays a pure function.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<FinishReason>,
}

impl TurnOutcome {
    pub fn has_invalid_tool_call(&self) -> bool {
        !self.tool_calls.is_empty() && self.tool_calls.iter().any(|c| c.call_id.trim().is_empty())
    }
}

/// One provider turn's classification outcome. `RetryTransient` and
/// `Fatal` mirror [`ProviderError`]'s two variants; `ToolCalls` and
/// `Compensation` are facts about a completed (non-error) response.
#[derive(Debug, Clone)]
pub enum Classification {
    Complete { content: String },
    ToolCalls { tool_calls: Vec<ToolCallRequest> },
    RetryTransient { code: String, message: String },
    Compensation,
    Fatal { code: FailureCode, message: String },
}

/// Classifies a provider-level failure — either `complete()` erroring before
/// any stream, or a streamed error chunk treated identically to a raised
/// error. A closed match, not string inspection.
pub fn classify_provider_error(err: &ProviderError) -> Classification {
    match err {
        ProviderError::Retryable { code, message } => Classification::RetryTransient { code: code.clone(), message: message.clone() },
        ProviderError::Fatal { message } => Classification::Fatal { code: FailureCode::LlmRequestFailed, message: message.clone() },
    }
}

/// Classifies a completed (non-error) turn per the response-classification
/// decision table: invalid tool-call shapes are fatal; non-empty tool calls
/// always run; empty content with no reasoning is a compensation retry
/// (distinct from a transport retry); everything else is a completion, with
/// reasoning standing in for content when `thinking` mode is enabled.
pub fn classify_outcome(outcome: &TurnOutcome, thinking: bool) -> Classification {
    if outcome.has_invalid_tool_call() {
        return Classification::Fatal { code: FailureCode::LlmResponseInvalid, message: "tool_calls response missing a callId".to_string() };
    }
    if !outcome.tool_calls.is_empty() {
        return Classification::ToolCalls { tool_calls: outcome.tool_calls.clone() };
    }
    if !outcome.content.trim().is_empty() {
        return Classification::Complete { content: outcome.content.clone() };
    }
    if thinking && !outcome.reasoning.trim().is_empty() {
        return Classification::Complete { content: outcome.reasoning.clone() };
    }
    Classification::Compensation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_and_reasoning_is_compensation() {
        let outcome = TurnOutcome { content: String::new(), reasoning: String::new(), tool_calls: vec![], finish_reason: Some(FinishReason::Stop) };
        assert!(matches!(classify_outcome(&outcome, false), Classification::Compensation));
    }

    #[test]
    fn non_empty_content_completes() {
        let outcome = TurnOutcome { content: "hello".into(), reasoning: String::new(), tool_calls: vec![], finish_reason: Some(FinishReason::Stop) };
        assert!(matches!(classify_outcome(&outcome, false), Classification::Complete { content } if content == "hello"));
    }

    #[test]
    fn reasoning_only_completes_when_thinking_enabled() {
        let outcome = TurnOutcome { content: String::new(), reasoning: "chain of thought".into(), tool_calls: vec![], finish_reason: Some(FinishReason::Stop) };
        assert!(matches!(classify_outcome(&outcome, true), Classification::Complete { .. }));
        assert!(matches!(classify_outcome(&outcome, false), Classification::Compensation));
    }

    #[test]
    fn tool_calls_take_priority_over_empty_content() {
        let outcome = TurnOutcome {
            content: String::new(),
            reasoning: String::new(),
            tool_calls: vec![ToolCallRequest { call_id: "c1".into(), tool_name: "glob".into(), args: serde_json::json!({}) }],
            finish_reason: Some(FinishReason::ToolCalls),
        };
        assert!(matches!(classify_outcome(&outcome, false), Classification::ToolCalls { .. }));
    }

    #[test]
    fn missing_call_id_is_fatal() {
        let outcome = TurnOutcome {
            content: String::new(),
            reasoning: String::new(),
            tool_calls: vec![ToolCallRequest { call_id: "".into(), tool_name: "glob".into(), args: serde_json::json!({}) }],
            finish_reason: Some(FinishReason::ToolCalls),
        };
        assert!(matches!(classify_outcome(&outcome, false), Classification::Fatal { code: FailureCode::LlmResponseInvalid, .. }));
    }

    #[test]
    fn provider_retryable_error_classifies_as_retry_transient() {
        let err = ProviderError::retryable("TIMEOUT", "gateway timeout");
        assert!(matches!(classify_provider_error(&err), Classification::RetryTransient { code, .. } if code == "TIMEOUT"));
    }

    #[test]
    fn provider_fatal_error_classifies_as_fatal() {
        let err = ProviderError::fatal("invalid_parameter_error");
        assert!(matches!(classify_provider_error(&err), Classification::Fatal { code: FailureCode::LlmRequestFailed, .. }));
    }
}
