use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single structured function-call request to dispatch.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub args: Value,
}

/// The outcome of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), success: true, output: output.into(), metadata: None, error: None }
    }

    pub fn err(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self { call_id: call_id.into(), success: false, output: message.clone(), metadata: None, error: Some(message) }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A cooperative cancellation flag shared between the loop engine and an
/// in-flight tool batch. `cancel()` is idempotent; tools poll `is_cancelled`
/// at their own suspension points — best-effort, matching the concurrency
/// model's "already-dispatched tools are asked to cancel" guarantee.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context handed to every tool invocation.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub session_id: String,
    pub working_directory: PathBuf,
    pub cancellation: CancellationSignal,
}

/// Hints the output-truncation middleware uses to pick a content-aware
/// extraction strategy without knowing concrete tool names (see `agent-core`'s
/// compaction module). Tools declare their own category; new tools register
/// without needing a truncation-side change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Keep the first and last N lines (e.g. shell command output).
    HeadTail,
    /// Keep the leading matches of a list (e.g. grep/glob results).
    MatchList,
    /// Keep head+tail lines of file content.
    FileContent,
    #[default]
    Generic,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    /// Whether results from this tool may contain sensitive data (credentials,
    /// tokens) and must pass through the sanitization policy before entering
    /// session history.
    fn sensitive(&self) -> bool {
        false
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
            ToolResult::ok(&call.call_id, call.args.to_string())
        }
    }

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext {
            session_id: "s".into(),
            working_directory: PathBuf::from("."),
            cancellation: CancellationSignal::new(),
        }
    }

    #[tokio::test]
    async fn echo_tool_roundtrips_args() {
        let call = ToolCall { call_id: "c1".into(), tool_name: "echo".into(), args: json!({"x": 1}) };
        let out = EchoTool.execute(&call, &ctx()).await;
        assert!(out.success);
        assert_eq!(out.output, r#"{"x":1}"#);
    }

    #[test]
    fn cancellation_signal_is_idempotent_and_shared() {
        let sig = CancellationSignal::new();
        let clone = sig.clone();
        assert!(!sig.is_cancelled());
        clone.cancel();
        assert!(sig.is_cancelled());
        sig.cancel();
        assert!(sig.is_cancelled());
    }

    #[test]
    fn default_output_category_is_generic() {
        assert_eq!(EchoTool.output_category(), OutputCategory::Generic);
    }
}
