use serde::{Deserialize, Serialize};

use agent_model::ToolCallRequest;

/// Lifecycle state carried by a `status` event. Chosen lowercase so it reads
/// the same on the wire regardless of which language consumes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Running,
    Retrying,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// Cumulative token usage. `total` is always recomputed as `prompt +
/// completion` rather than trusted from upstream, since providers
/// occasionally report an inconsistent total of their own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl Usage {
    pub fn add(&mut self, prompt: u64, completion: u64) {
        self.prompt += prompt;
        self.completion += completion;
        self.total = self.prompt + self.completion;
    }
}

/// The closed set of event payload shapes. `type` is the serde tag so any
/// transport (NDJSON, websocket frame, gRPC) can dispatch on one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "text-start")]
    TextStart,
    #[serde(rename = "text-delta")]
    TextDelta { content: String },
    #[serde(rename = "text-complete")]
    TextComplete { content: String },

    #[serde(rename = "reasoning-start")]
    ReasoningStart,
    #[serde(rename = "reasoning-delta")]
    ReasoningDelta { content: String },
    #[serde(rename = "reasoning-complete")]
    ReasoningComplete { content: String },

    #[serde(rename = "tool_call_created")]
    ToolCallCreated { tool_calls: Vec<ToolCallRequest>, content: Option<String> },
    #[serde(rename = "tool_call_stream")]
    ToolCallStream { call_id: String, output: String },
    #[serde(rename = "tool_call_result")]
    ToolCallResult { call_id: String, result: serde_json::Value, status: ToolResultStatus, exit_code: Option<i32> },

    #[serde(rename = "code_patch")]
    CodePatch { path: String, unified_diff: String, language: Option<String> },

    #[serde(rename = "usage_update")]
    UsageUpdate { usage: Usage },

    #[serde(rename = "status")]
    Status { state: AgentStatus, message: String },

    #[serde(rename = "error")]
    Error { code: String, message: String },

    #[serde(rename = "subagent_event")]
    SubagentEvent { task_id: String, child_session_id: String, subagent_type: Option<String>, inner: Box<Event> },
}

/// One event on the wire: a payload plus the envelope fields every variant
/// carries. `msg_id` is only present when the emitting call knew one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub timestamp: i64,
    pub msg_id: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}
