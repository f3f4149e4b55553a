use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextStatus {
    Streaming,
    Completed,
}

#[derive(Debug, Clone)]
pub struct AssistantText {
    pub msg_id: String,
    pub content: String,
    pub status: TextStatus,
}

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_index: usize,
    pub tool_name: String,
    pub args: Value,
    pub output: String,
    pub result: Option<Value>,
}

/// Rebuilt conversation state for a single stream. Mutated in place by
/// [`crate::reduce::reduce`]; replay a recorded event sequence into a fresh
/// `AdapterState` to reproduce the final conversation deterministically.
#[derive(Debug, Default)]
pub struct AdapterState {
    pub assistant_messages: Vec<AssistantText>,
    pub reasoning_messages: Vec<AssistantText>,
    pub tool_invocations: Vec<ToolInvocation>,

    pub(crate) open_assistant: Option<String>,
    pub(crate) open_reasoning: Option<String>,
    pub(crate) by_msg_id: HashMap<String, usize>,
    pub(crate) by_reasoning_msg_id: HashMap<String, usize>,
    pub(crate) by_call_id: HashMap<String, usize>,

    pub(crate) children: HashMap<String, Box<AdapterState>>,
}

impl AdapterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assistant_text(&self, msg_id: &str) -> Option<&AssistantText> {
        self.by_msg_id.get(msg_id).map(|&i| &self.assistant_messages[i])
    }

    pub fn tool_invocation(&self, call_id: &str) -> Option<&ToolInvocation> {
        self.by_call_id.get(call_id).map(|&i| &self.tool_invocations[i])
    }

    /// Resets per-run state. Conversation history already reported to a
    /// consumer is not retained here; the caller owns that.
    pub fn reset(&mut self) {
        *self = AdapterState::new();
    }
}
