use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;

use agent_model::ToolCallRequest;

use crate::event::{AgentStatus, Event, EventPayload, ToolResultStatus, Usage};

/// Supplies the monotonic timestamp stamped onto every event. Injected so
/// traces stay reproducible in tests; production code uses `SystemClock`.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
    }
}

fn budget_truncate(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = s[..end].to_string();
    out.push_str("[...truncated]");
    out
}

fn serialize_result(value: impl Serialize, max_bytes: usize) -> serde_json::Value {
    match serde_json::to_value(&value) {
        Ok(v) => {
            let rendered = v.to_string();
            if rendered.len() <= max_bytes {
                v
            } else {
                serde_json::Value::String(budget_truncate(rendered, max_bytes))
            }
        }
        Err(e) => serde_json::Value::String(budget_truncate(format!("<unserializable tool result: {e}>"), max_bytes)),
    }
}

/// The single producer of events for one run. Never throws: a closed
/// channel is logged at `warn` and the event is dropped, not propagated to
/// the caller.
pub struct Emitter {
    session_id: String,
    sender: mpsc::Sender<Event>,
    clock: Box<dyn Clock>,
    usage: Mutex<Usage>,
    max_output_bytes: usize,
}

impl Emitter {
    pub fn new(session_id: impl Into<String>, sender: mpsc::Sender<Event>) -> Self {
        Self::with_clock(session_id, sender, Box::new(SystemClock))
    }

    pub fn with_clock(session_id: impl Into<String>, sender: mpsc::Sender<Event>, clock: Box<dyn Clock>) -> Self {
        Self { session_id: session_id.into(), sender, clock, usage: Mutex::new(Usage::default()), max_output_bytes: 64 * 1024 }
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, msg_id: Option<String>, payload: EventPayload) {
        let event = Event { session_id: self.session_id.clone(), timestamp: self.clock.now_ms(), msg_id, payload };
        tracing::trace!(session_id = %event.session_id, ?event.payload, "emit");
        if self.sender.send(event).await.is_err() {
            tracing::warn!(session_id = %self.session_id, "event channel closed, dropping event");
        }
    }

    pub async fn emit_status(&self, state: AgentStatus, message: impl Into<String>, msg_id: Option<String>) {
        self.send(msg_id, EventPayload::Status { state, message: message.into() }).await;
    }

    pub async fn emit_text_start(&self, msg_id: impl Into<String>) {
        self.send(Some(msg_id.into()), EventPayload::TextStart).await;
    }

    pub async fn emit_text_delta(&self, content: impl Into<String>, msg_id: impl Into<String>) {
        self.send(Some(msg_id.into()), EventPayload::TextDelta { content: content.into() }).await;
    }

    pub async fn emit_text_complete(&self, content: impl Into<String>, msg_id: impl Into<String>) {
        self.send(Some(msg_id.into()), EventPayload::TextComplete { content: content.into() }).await;
    }

    pub async fn emit_reasoning_start(&self, msg_id: impl Into<String>) {
        self.send(Some(msg_id.into()), EventPayload::ReasoningStart).await;
    }

    pub async fn emit_reasoning_delta(&self, content: impl Into<String>, msg_id: impl Into<String>) {
        self.send(Some(msg_id.into()), EventPayload::ReasoningDelta { content: content.into() }).await;
    }

    pub async fn emit_reasoning_complete(&self, content: impl Into<String>, msg_id: impl Into<String>) {
        self.send(Some(msg_id.into()), EventPayload::ReasoningComplete { content: content.into() }).await;
    }

    pub async fn emit_tool_call_created(&self, tool_calls: Vec<ToolCallRequest>, msg_id: impl Into<String>, content: Option<String>) {
        self.send(Some(msg_id.into()), EventPayload::ToolCallCreated { tool_calls, content }).await;
    }

    pub async fn emit_tool_call_stream(&self, call_id: impl Into<String>, output: impl Into<String>, msg_id: Option<String>) {
        let output = budget_truncate(output.into(), self.max_output_bytes);
        self.send(msg_id, EventPayload::ToolCallStream { call_id: call_id.into(), output }).await;
    }

    pub async fn emit_tool_call_result(
        &self,
        call_id: impl Into<String>,
        result: impl Serialize,
        status: ToolResultStatus,
        msg_id: Option<String>,
        exit_code: Option<i32>,
    ) {
        let result = serialize_result(result, self.max_output_bytes);
        self.send(msg_id, EventPayload::ToolCallResult { call_id: call_id.into(), result, status, exit_code }).await;
    }

    pub async fn emit_code_patch(&self, path: impl Into<String>, unified_diff: impl Into<String>, msg_id: impl Into<String>, language: Option<String>) {
        self.send(Some(msg_id.into()), EventPayload::CodePatch { path: path.into(), unified_diff: unified_diff.into(), language }).await;
    }

    /// Accumulates usage internally; `total` is recomputed from the running
    /// sum every call, not trusted from the caller's numbers.
    pub async fn emit_usage_update(&self, prompt: u64, completion: u64, msg_id: Option<String>) {
        let usage = {
            let mut guard = self.usage.lock().expect("usage mutex poisoned");
            guard.add(prompt, completion);
            *guard
        };
        self.send(msg_id, EventPayload::UsageUpdate { usage }).await;
    }

    pub async fn emit_error(&self, code: impl Into<String>, message: impl Into<String>, msg_id: Option<String>) {
        self.send(msg_id, EventPayload::Error { code: code.into(), message: message.into() }).await;
    }

    /// Wraps a child event for bubbling up to the parent's stream. Nested
    /// wrapping (a sub-agent's sub-agent) is allowed: `inner` is itself an
    /// `Event`, which may already be a `SubagentEvent`.
    pub async fn emit_subagent_event(&self, task_id: impl Into<String>, child_session_id: impl Into<String>, subagent_type: Option<String>, inner: Event) {
        self.send(
            None,
            EventPayload::SubagentEvent { task_id: task_id.into(), child_session_id: child_session_id.into(), subagent_type, inner: Box::new(inner) },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    struct FixedClock(i64);
    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    #[tokio::test]
    async fn stamps_session_id_and_clock_timestamp() {
        let (tx, mut rx) = mpsc::channel(8);
        let emitter = Emitter::with_clock("s1", tx, Box::new(FixedClock(42)));
        emitter.emit_text_start("m1").await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.timestamp, 42);
        assert_eq!(event.msg_id.as_deref(), Some("m1"));
        assert!(matches!(event.payload, EventPayload::TextStart));
    }

    #[tokio::test]
    async fn never_panics_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let emitter = Emitter::new("s1", tx);
        emitter.emit_status(AgentStatus::Idle, "no one listening", None).await;
    }

    #[tokio::test]
    async fn usage_total_is_recomputed_each_call_not_trusted() {
        let (tx, mut rx) = mpsc::channel(8);
        let emitter = Emitter::new("s1", tx);
        emitter.emit_usage_update(10, 5, None).await;
        emitter.emit_usage_update(3, 2, None).await;
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let EventPayload::UsageUpdate { usage } = first.payload else { panic!("wrong payload") };
        assert_eq!(usage, Usage { prompt: 10, completion: 5, total: 15 });
        let EventPayload::UsageUpdate { usage } = second.payload else { panic!("wrong payload") };
        assert_eq!(usage, Usage { prompt: 13, completion: 7, total: 20 });
    }

    #[tokio::test]
    async fn tool_call_stream_output_is_truncated_at_byte_budget() {
        let (tx, mut rx) = mpsc::channel(8);
        let emitter = Emitter::new("s1", tx).with_max_output_bytes(5);
        emitter.emit_tool_call_stream("c1", "0123456789", None).await;
        let event = rx.recv().await.unwrap();
        let EventPayload::ToolCallStream { output, .. } = event.payload else { panic!("wrong payload") };
        assert!(output.starts_with("01234"));
        assert!(output.ends_with("[...truncated]"));
    }

    #[tokio::test]
    async fn tool_call_result_serializes_json_when_small() {
        let (tx, mut rx) = mpsc::channel(8);
        let emitter = Emitter::new("s1", tx);
        emitter.emit_tool_call_result("c1", serde_json::json!({"paths": ["a.rs", "b.rs"]}), ToolResultStatus::Success, None, None).await;
        let event = rx.recv().await.unwrap();
        let EventPayload::ToolCallResult { result, .. } = event.payload else { panic!("wrong payload") };
        assert_eq!(result["paths"][0], "a.rs");
    }

    #[tokio::test]
    async fn subagent_event_wraps_inner_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let emitter = Emitter::new("parent", tx);
        let (child_tx, mut child_rx) = mpsc::channel(8);
        let child_emitter = Emitter::new("child", child_tx);
        child_emitter.emit_text_start("cm1").await;
        let inner = child_rx.recv().await.unwrap();
        emitter.emit_subagent_event("t1", "child", Some("explorer".to_string()), inner).await;
        let event = rx.recv().await.unwrap();
        let EventPayload::SubagentEvent { task_id, child_session_id, inner, .. } = event.payload else { panic!("wrong payload") };
        assert_eq!(task_id, "t1");
        assert_eq!(child_session_id, "child");
        assert_eq!(inner.session_id, "child");
    }
}
