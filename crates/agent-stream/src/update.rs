use agent_events::{AgentStatus, ToolResultStatus, Usage};

/// A logical change to the rebuilt conversation, produced by [`reduce`].
/// Driver-level timer batching coalesces consecutive `AssistantTextAppended`
/// updates before handing them to a consumer; `reduce` itself emits one
/// update per relevant input event with no notion of time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationUpdate {
    AssistantTextStarted { msg_id: String },
    AssistantTextAppended { msg_id: String, delta: String, content_so_far: String },
    AssistantTextCompleted { msg_id: String, content: String },

    ReasoningStarted { msg_id: String },
    ReasoningAppended { msg_id: String, delta: String },
    ReasoningCompleted { msg_id: String, content: String },

    ToolCallCreated { call_id: String, tool_index: usize, tool_name: String, args: serde_json::Value },
    ToolCallStreamed { call_id: String, output: String },
    ToolCallResolved { call_id: String, status: ToolResultStatus, result: serde_json::Value, exit_code: Option<i32> },

    CodePatch { path: String, unified_diff: String, language: Option<String> },

    UsageUpdated { usage: Usage },
    StatusChanged { state: AgentStatus, message: String },
    ErrorRaised { code: String, message: String },

    SubagentUpdate { task_id: String, child_session_id: String, update: Box<ConversationUpdate> },

    SessionComplete,
}
