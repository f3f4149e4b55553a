use agent_events::{AgentStatus, Event, EventPayload};

use crate::state::{AdapterState, AssistantText, TextStatus, ToolInvocation};
use crate::update::ConversationUpdate;

fn is_terminal(state: AgentStatus) -> bool {
    matches!(state, AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Aborted)
}

fn flush_open_assistant(state: &mut AdapterState, out: &mut Vec<ConversationUpdate>) {
    if let Some(msg_id) = state.open_assistant.take() {
        if let Some(&idx) = state.by_msg_id.get(&msg_id) {
            let entry = &mut state.assistant_messages[idx];
            if entry.status == TextStatus::Streaming {
                entry.status = TextStatus::Completed;
                out.push(ConversationUpdate::AssistantTextCompleted { msg_id: msg_id.clone(), content: entry.content.clone() });
            }
        }
    }
}

fn flush_open_reasoning(state: &mut AdapterState, out: &mut Vec<ConversationUpdate>) {
    if let Some(msg_id) = state.open_reasoning.take() {
        if let Some(&idx) = state.by_reasoning_msg_id.get(&msg_id) {
            let entry = &mut state.reasoning_messages[idx];
            if entry.status == TextStatus::Streaming {
                entry.status = TextStatus::Completed;
                out.push(ConversationUpdate::ReasoningCompleted { msg_id: msg_id.clone(), content: entry.content.clone() });
            }
        }
    }
}

fn ensure_assistant_open(state: &mut AdapterState, msg_id: &str, out: &mut Vec<ConversationUpdate>) {
    if state.open_assistant.as_deref() == Some(msg_id) {
        return;
    }
    flush_open_assistant(state, out);
    if !state.by_msg_id.contains_key(msg_id) {
        let idx = state.assistant_messages.len();
        state.assistant_messages.push(AssistantText { msg_id: msg_id.to_string(), content: String::new(), status: TextStatus::Streaming });
        state.by_msg_id.insert(msg_id.to_string(), idx);
    }
    state.open_assistant = Some(msg_id.to_string());
    out.push(ConversationUpdate::AssistantTextStarted { msg_id: msg_id.to_string() });
}

fn ensure_reasoning_open(state: &mut AdapterState, msg_id: &str, out: &mut Vec<ConversationUpdate>) {
    if state.open_reasoning.as_deref() == Some(msg_id) {
        return;
    }
    flush_open_reasoning(state, out);
    if !state.by_reasoning_msg_id.contains_key(msg_id) {
        let idx = state.reasoning_messages.len();
        state.reasoning_messages.push(AssistantText { msg_id: msg_id.to_string(), content: String::new(), status: TextStatus::Streaming });
        state.by_reasoning_msg_id.insert(msg_id.to_string(), idx);
    }
    state.open_reasoning = Some(msg_id.to_string());
    out.push(ConversationUpdate::ReasoningStarted { msg_id: msg_id.to_string() });
}

/// Pure state transition: one event in, zero or more logical updates out. No
/// I/O, no clock, no timer — replaying a recorded `Vec<Event>` through this
/// function reproduces the final conversation deterministically.
pub fn reduce(state: &mut AdapterState, event: &Event) -> Vec<ConversationUpdate> {
    let mut out = Vec::new();
    match &event.payload {
        EventPayload::TextStart => {
            if let Some(msg_id) = &event.msg_id {
                ensure_assistant_open(state, msg_id, &mut out);
            }
        }
        EventPayload::TextDelta { content } => {
            if let Some(msg_id) = &event.msg_id {
                ensure_assistant_open(state, msg_id, &mut out);
                let idx = state.by_msg_id[msg_id];
                let entry = &mut state.assistant_messages[idx];
                entry.content.push_str(content);
                out.push(ConversationUpdate::AssistantTextAppended { msg_id: msg_id.clone(), delta: content.clone(), content_so_far: entry.content.clone() });
            }
        }
        EventPayload::TextComplete { content } => {
            if let Some(msg_id) = &event.msg_id {
                ensure_assistant_open(state, msg_id, &mut out);
                let idx = state.by_msg_id[msg_id];
                let entry = &mut state.assistant_messages[idx];
                entry.content = content.clone();
                entry.status = TextStatus::Completed;
                state.open_assistant = None;
                out.push(ConversationUpdate::AssistantTextCompleted { msg_id: msg_id.clone(), content: content.clone() });
            }
        }
        EventPayload::ReasoningStart => {
            if let Some(msg_id) = &event.msg_id {
                ensure_reasoning_open(state, msg_id, &mut out);
            }
        }
        EventPayload::ReasoningDelta { content } => {
            if let Some(msg_id) = &event.msg_id {
                ensure_reasoning_open(state, msg_id, &mut out);
                let idx = state.by_reasoning_msg_id[msg_id];
                let entry = &mut state.reasoning_messages[idx];
                entry.content.push_str(content);
                out.push(ConversationUpdate::ReasoningAppended { msg_id: msg_id.clone(), delta: content.clone() });
            }
        }
        EventPayload::ReasoningComplete { content } => {
            if let Some(msg_id) = &event.msg_id {
                ensure_reasoning_open(state, msg_id, &mut out);
                let idx = state.by_reasoning_msg_id[msg_id];
                let entry = &mut state.reasoning_messages[idx];
                entry.content = content.clone();
                entry.status = TextStatus::Completed;
                state.open_reasoning = None;
                out.push(ConversationUpdate::ReasoningCompleted { msg_id: msg_id.clone(), content: content.clone() });
            }
        }
        EventPayload::ToolCallCreated { tool_calls, .. } => {
            flush_open_assistant(state, &mut out);
            flush_open_reasoning(state, &mut out);
            for (tool_index, call) in tool_calls.iter().enumerate() {
                if let Some(&idx) = state.by_call_id.get(&call.call_id) {
                    let entry = &mut state.tool_invocations[idx];
                    if !call.tool_name.is_empty() {
                        entry.tool_name = call.tool_name.clone();
                    }
                    if !call.args.is_null() {
                        entry.args = call.args.clone();
                    }
                    out.push(ConversationUpdate::ToolCallCreated { call_id: entry.call_id.clone(), tool_index: entry.tool_index, tool_name: entry.tool_name.clone(), args: entry.args.clone() });
                } else {
                    let idx = state.tool_invocations.len();
                    state.tool_invocations.push(ToolInvocation {
                        call_id: call.call_id.clone(),
                        tool_index,
                        tool_name: call.tool_name.clone(),
                        args: call.args.clone(),
                        output: String::new(),
                        result: None,
                    });
                    state.by_call_id.insert(call.call_id.clone(), idx);
                    out.push(ConversationUpdate::ToolCallCreated { call_id: call.call_id.clone(), tool_index, tool_name: call.tool_name.clone(), args: call.args.clone() });
                }
            }
        }
        EventPayload::ToolCallStream { call_id, output } => match state.by_call_id.get(call_id) {
            Some(&idx) => {
                state.tool_invocations[idx].output.push_str(output);
                out.push(ConversationUpdate::ToolCallStreamed { call_id: call_id.clone(), output: output.clone() });
            }
            None => tracing::warn!(call_id, "tool_call_stream for unknown callId, dropping"),
        },
        EventPayload::ToolCallResult { call_id, result, status, exit_code } => match state.by_call_id.get(call_id) {
            Some(&idx) => {
                state.tool_invocations[idx].result = Some(result.clone());
                out.push(ConversationUpdate::ToolCallResolved { call_id: call_id.clone(), status: *status, result: result.clone(), exit_code: *exit_code });
            }
            None => tracing::warn!(call_id, "tool_call_result for unknown callId, dropping"),
        },
        EventPayload::CodePatch { path, unified_diff, language } => {
            out.push(ConversationUpdate::CodePatch { path: path.clone(), unified_diff: unified_diff.clone(), language: language.clone() });
        }
        EventPayload::UsageUpdate { usage } => {
            out.push(ConversationUpdate::UsageUpdated { usage: *usage });
        }
        EventPayload::Status { state: agent_state, message } => {
            let terminal = is_terminal(*agent_state);
            if terminal {
                flush_open_assistant(state, &mut out);
                flush_open_reasoning(state, &mut out);
            }
            out.push(ConversationUpdate::StatusChanged { state: *agent_state, message: message.clone() });
            if terminal {
                out.push(ConversationUpdate::SessionComplete);
                state.reset();
            }
        }
        EventPayload::Error { code, message } => {
            flush_open_assistant(state, &mut out);
            flush_open_reasoning(state, &mut out);
            out.push(ConversationUpdate::ErrorRaised { code: code.clone(), message: message.clone() });
        }
        EventPayload::SubagentEvent { task_id, child_session_id, inner, .. } => {
            let child = state.children.entry(child_session_id.clone()).or_insert_with(|| Box::new(AdapterState::new()));
            let inner_updates = reduce(child, inner);
            for update in inner_updates {
                out.push(ConversationUpdate::SubagentUpdate { task_id: task_id.clone(), child_session_id: child_session_id.clone(), update: Box::new(update) });
            }
        }
    }
    out
}
