use serde::{Deserialize, Serialize};

/// The closed set of terminal failure codes an `execute` call can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    AgentAborted,
    AgentLoopExceeded,
    AgentMaxRetriesExceeded,
    LlmTimeout,
    LlmRequestFailed,
    LlmResponseInvalid,
    ToolExecutionFailed,
    AgentRuntimeError,
}

/// A terminal failure: a stable `user_message` plus an optional
/// `internal_message` carrying the original error text for logging. Every
/// final `failed`/`aborted` result carries exactly one of these.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub code: FailureCode,
    pub user_message: String,
    pub internal_message: Option<String>,
}

impl ClassifiedError {
    pub fn new(code: FailureCode, user_message: impl Into<String>) -> Self {
        Self { code, user_message: user_message.into(), internal_message: None }
    }

    pub fn with_internal(mut self, internal_message: impl Into<String>) -> Self {
        self.internal_message = Some(internal_message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_code_serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&FailureCode::AgentLoopExceeded).unwrap();
        assert_eq!(json, "\"AGENT_LOOP_EXCEEDED\"");
    }
}
