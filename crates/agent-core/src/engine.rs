use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use agent_events::{AgentStatus, Emitter, ToolResultStatus};
use agent_memory::Memory;
use agent_model::{CompletionRequest, Message, ModelProvider, ToolCallRequest, ToolSchema as ModelToolSchema};
use agent_tools::{CancellationSignal, SanitizationPolicy, ToolCall, ToolExecutionContext, ToolRegistry};

use crate::classify::{classify_outcome, classify_provider_error, Classification, TurnOutcome};
use crate::compaction::{compact_session, emergency_compact, should_compact, truncate_tool_output};
use crate::config::AgentLoopConfig;
use crate::error::{ClassifiedError, FailureCode};

/// The outcome of one [`AgentLoop::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub session_id: String,
    pub status: AgentStatus,
    pub final_message: Option<String>,
    pub failure: Option<ClassifiedError>,
    pub loop_count: u32,
    pub retry_count: u32,
}

/// One think/act loop over a session: calls the provider, dispatches any
/// requested tools, retries transient and empty-response failures, and
/// compacts history proactively when it grows too large. Owns no session
/// storage itself — all history lives behind the injected [`Memory`].
pub struct AgentLoop {
    session_id: String,
    memory: Arc<dyn Memory>,
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    emitter: Arc<Emitter>,
    sanitizer: Arc<dyn SanitizationPolicy>,
    config: AgentLoopConfig,
    cancellation: CancellationSignal,
    busy: AtomicBool,
    model_override: Option<String>,
}

impl AgentLoop {
    pub fn new(
        session_id: impl Into<String>,
        memory: Arc<dyn Memory>,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        emitter: Arc<Emitter>,
        sanitizer: Arc<dyn SanitizationPolicy>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            memory,
            provider,
            tools,
            emitter,
            sanitizer,
            config,
            cancellation: CancellationSignal::new(),
            busy: AtomicBool::new(false),
            model_override: None,
        }
    }

    /// Overrides the model name sent on every completion request, used by
    /// the sub-task runtime's model-routing hint. Left unset, the provider's
    /// own default applies.
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    /// The signal external callers use to abort an in-flight `execute` call.
    pub fn cancellation(&self) -> CancellationSignal {
        self.cancellation.clone()
    }

    /// Runs one turn-taking session to completion: repeated provider calls,
    /// tool dispatch, and retries until a final assistant message, a fatal
    /// error, or an exhausted budget ends the run.
    pub async fn execute(&self, input: Message) -> ExecutionResult {
        if self.busy.swap(true, Ordering::SeqCst) {
            return ExecutionResult {
                session_id: self.session_id.clone(),
                status: AgentStatus::Failed,
                final_message: None,
                failure: Some(ClassifiedError::new(FailureCode::AgentRuntimeError, "a run is already in progress for this session")),
                loop_count: 0,
                retry_count: 0,
            };
        }
        let result = self.execute_inner(input).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn execute_inner(&self, input: Message) -> ExecutionResult {
        if input.content.is_empty() {
            return self.fail(FailureCode::AgentRuntimeError, "input message must not be empty", 0, 0).await;
        }
        if self.cancellation.is_cancelled() {
            return self.finish(AgentStatus::Aborted, None, Some(ClassifiedError::new(FailureCode::AgentAborted, "run was cancelled before it started")), 0, 0).await;
        }

        if let Err(e) = self.memory.add_message_to_context(&self.session_id, input).await {
            return self.fail(FailureCode::AgentRuntimeError, format!("failed to record input: {e}"), 0, 0).await;
        }

        let mut loop_count: u32 = 0;
        let mut retry_count: u32 = 0;
        let mut total_retry_count: u32 = 0;
        let mut compensation_retry_count: u32 = 0;

        loop {
            if self.cancellation.is_cancelled() {
                return self.finish(AgentStatus::Aborted, None, Some(ClassifiedError::new(FailureCode::AgentAborted, "run cancelled")), loop_count, total_retry_count).await;
            }

            loop_count += 1;
            if loop_count > self.config.max_loops {
                return self.fail(
                    FailureCode::AgentLoopExceeded,
                    format!("exceeded the configured limit of {} loop iterations", self.config.max_loops),
                    loop_count,
                    total_retry_count,
                )
                .await;
            }

            let span = tracing::info_span!("agent_loop", session_id = %self.session_id, loop_count);
            let _entered = span.enter();

            if self.config.enable_compaction {
                self.maybe_compact().await;
            }

            let history = match self.memory.get_current_context(&self.session_id).await {
                Ok(h) => h,
                Err(e) => return self.fail(FailureCode::AgentRuntimeError, format!("failed to load session context: {e}"), loop_count, total_retry_count).await,
            };

            self.emitter.emit_status(AgentStatus::Thinking, "waiting on model response", None).await;
            let outcome = self.stream_one_turn(history).await;

            let classification = match &outcome {
                Ok(outcome) => classify_outcome(outcome, self.config.thinking),
                Err(err) => classify_provider_error(err),
            };

            match classification {
                Classification::Complete { content } => {
                    let msg_id = uuid::Uuid::new_v4().to_string();
                    let msg = Message::assistant(msg_id, content.clone());
                    if let Err(e) = self.memory.add_message_to_context(&self.session_id, msg).await {
                        return self.fail(FailureCode::AgentRuntimeError, format!("failed to record final message: {e}"), loop_count, total_retry_count).await;
                    }
                    return self.finish(AgentStatus::Completed, Some(content), None, loop_count, total_retry_count).await;
                }
                Classification::ToolCalls { tool_calls } => {
                    if self.cancellation.is_cancelled() {
                        return self.finish(AgentStatus::Aborted, None, Some(ClassifiedError::new(FailureCode::AgentAborted, "run cancelled before tool dispatch")), loop_count, total_retry_count).await;
                    }
                    if let Err(e) = self.dispatch_tool_calls(&tool_calls).await {
                        return self.fail(FailureCode::ToolExecutionFailed, format!("failed to record tool dispatch: {e}"), loop_count, total_retry_count).await;
                    }
                    retry_count = 0;
                    continue;
                }
                Classification::RetryTransient { code, message } => {
                    retry_count += 1;
                    total_retry_count += 1;
                    if retry_count > self.config.max_retries {
                        return self.fail(
                            FailureCode::AgentMaxRetriesExceeded,
                            format!("exceeded {} retries; last error [{code}] {message}", self.config.max_retries),
                            loop_count,
                            total_retry_count,
                        )
                        .await;
                    }
                    self.emitter.emit_status(AgentStatus::Retrying, format!("Retrying... [{code}] {message}"), None).await;
                    self.cancellable_sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                    loop_count -= 1;
                    continue;
                }
                Classification::Compensation => {
                    compensation_retry_count += 1;
                    if compensation_retry_count > self.config.max_compensation_retries {
                        return self.fail(
                            FailureCode::AgentMaxRetriesExceeded,
                            "exceeded compensation retries for an empty model response",
                            loop_count,
                            total_retry_count,
                        )
                        .await;
                    }
                    self.emitter.emit_status(AgentStatus::Retrying, "Compensation retry: EMPTY_RESPONSE", None).await;
                    continue;
                }
                Classification::Fatal { code, message } => {
                    return self.fail(code, message, loop_count, total_retry_count).await;
                }
            }
        }
    }

    /// Streams one provider turn, emitting incremental text/reasoning/tool
    /// events as they arrive, and accumulates them into a [`TurnOutcome`].
    async fn stream_one_turn(&self, history: Vec<Message>) -> Result<TurnOutcome, agent_model::ProviderError> {
        let tools: Vec<ModelToolSchema> = self
            .tools
            .to_llm_tools()
            .into_iter()
            .map(|s| ModelToolSchema { name: s.name, description: s.description, parameters: s.parameters })
            .collect();

        let mut request = CompletionRequest::new(self.session_id.clone(), history);
        request.tools = tools;
        request.stream = self.config.stream;
        request.model = self.model_override.clone();

        let mut stream = self.provider.complete(request).await?;

        let msg_id = uuid::Uuid::new_v4().to_string();
        let mut outcome = TurnOutcome::default();
        let mut text_started = false;
        let mut reasoning_started = false;
        // tool_index -> (call_id, tool_name, accumulated arguments json text)
        let mut pending_calls: HashMap<u32, (Option<String>, Option<String>, String)> = HashMap::new();
        let mut call_order: Vec<u32> = Vec::new();

        let mut buffered_bytes: usize = 0;

        while let Some(event) = stream.next().await {
            let event = event?;
            match event {
                agent_model::ResponseEvent::TextDelta { content, .. } => {
                    buffered_bytes += content.len();
                    if buffered_bytes > self.config.max_buffer_size {
                        return Err(agent_model::ProviderError::fatal(format!(
                            "exceeded max buffer size of {} bytes while streaming a response",
                            self.config.max_buffer_size
                        )));
                    }
                    if !text_started {
                        self.emitter.emit_text_start(msg_id.clone()).await;
                        text_started = true;
                    }
                    self.emitter.emit_text_delta(content.clone(), msg_id.clone()).await;
                    outcome.content.push_str(&content);
                }
                agent_model::ResponseEvent::ReasoningDelta { content, .. } => {
                    buffered_bytes += content.len();
                    if buffered_bytes > self.config.max_buffer_size {
                        return Err(agent_model::ProviderError::fatal(format!(
                            "exceeded max buffer size of {} bytes while streaming a response",
                            self.config.max_buffer_size
                        )));
                    }
                    if !reasoning_started {
                        self.emitter.emit_reasoning_start(msg_id.clone()).await;
                        reasoning_started = true;
                    }
                    self.emitter.emit_reasoning_delta(content.clone(), msg_id.clone()).await;
                    outcome.reasoning.push_str(&content);
                }
                agent_model::ResponseEvent::ToolCallDelta { tool_index, call_id, tool_name, arguments_fragment, .. } => {
                    buffered_bytes += arguments_fragment.len();
                    if buffered_bytes > self.config.max_buffer_size {
                        return Err(agent_model::ProviderError::fatal(format!(
                            "exceeded max buffer size of {} bytes while streaming a response",
                            self.config.max_buffer_size
                        )));
                    }
                    if !call_order.contains(&tool_index) {
                        call_order.push(tool_index);
                    }
                    let entry = pending_calls.entry(tool_index).or_insert((None, None, String::new()));
                    if call_id.is_some() {
                        entry.0 = call_id;
                    }
                    if tool_name.is_some() {
                        entry.1 = tool_name;
                    }
                    entry.2.push_str(&arguments_fragment);
                }
                agent_model::ResponseEvent::Usage(usage) => {
                    self.emitter.emit_usage_update(usage.prompt_tokens, usage.completion_tokens, None).await;
                }
                agent_model::ResponseEvent::Done { finish_reason, .. } => {
                    outcome.finish_reason = finish_reason;
                }
                agent_model::ResponseEvent::Error { code, message } => {
                    return Err(agent_model::ProviderError::retryable(code, message));
                }
            }
        }

        if text_started {
            self.emitter.emit_text_complete(outcome.content.clone(), msg_id.clone()).await;
        }
        if reasoning_started {
            self.emitter.emit_reasoning_complete(outcome.reasoning.clone(), msg_id.clone()).await;
        }

        for tool_index in call_order {
            let (call_id, tool_name, args_text) = pending_calls.remove(&tool_index).unwrap_or_default();
            let args = serde_json::from_str(&args_text).unwrap_or(serde_json::Value::Null);
            outcome.tool_calls.push(ToolCallRequest {
                call_id: call_id.unwrap_or_default(),
                tool_name: tool_name.unwrap_or_default(),
                args,
            });
        }

        if !outcome.tool_calls.is_empty() {
            self.emitter.emit_tool_call_created(outcome.tool_calls.clone(), msg_id.clone(), if outcome.content.is_empty() { None } else { Some(outcome.content.clone()) }).await;
        }

        Ok(outcome)
    }

    /// Pushes the assistant's tool-call message, dispatches every requested
    /// tool concurrently, and pushes one tool-result message per call — all
    /// assistant tool-call entries precede any tool-result entries, matching
    /// the parallel-tool-call wire convention most providers expect.
    async fn dispatch_tool_calls(&self, tool_calls: &[ToolCallRequest]) -> Result<(), agent_memory::MemoryError> {
        let assistant_msg = Message::assistant_tool_calls(uuid::Uuid::new_v4().to_string(), tool_calls.to_vec());
        self.memory.add_message_to_context(&self.session_id, assistant_msg).await?;

        let calls: Vec<ToolCall> = tool_calls.iter().map(|c| ToolCall { call_id: c.call_id.clone(), tool_name: c.tool_name.clone(), args: c.args.clone() }).collect();
        let ctx = ToolExecutionContext { session_id: self.session_id.clone(), working_directory: std::env::current_dir().unwrap_or_default(), cancellation: self.cancellation.clone() };
        let results = self.tools.execute_batch(&calls, &ctx).await;

        for (call, result) in tool_calls.iter().zip(results.iter()) {
            let status = if result.success { ToolResultStatus::Success } else { ToolResultStatus::Error };
            self.emitter.emit_tool_call_result(call.call_id.clone(), result.clone(), status, None, None).await;

            let sensitive = self.tools.get(&call.tool_name).map(|t| t.sensitive()).unwrap_or(false);
            let category = self.tools.get(&call.tool_name).map(|t| t.output_category()).unwrap_or_default();
            let mut content = result.output.clone();
            if sensitive {
                content = self.sanitizer.sanitize(&content);
            }
            content = truncate_tool_output(&content, category, self.config.tool_result_char_cap);

            let tool_msg = Message::tool_result(uuid::Uuid::new_v4().to_string(), call.call_id.clone(), content);
            self.memory.add_message_to_context(&self.session_id, tool_msg).await?;
        }
        Ok(())
    }

    async fn maybe_compact(&self) {
        let history = match self.memory.get_full_history(&self.session_id).await {
            Ok(h) => h,
            Err(_) => return,
        };
        let total_tokens: usize = history.iter().map(|m| m.approx_tokens()).sum();
        if !should_compact(total_tokens, &self.config.compaction) {
            return;
        }
        if total_tokens > self.config.compaction.max_tokens * 2 {
            let compacted = emergency_compact(&history, self.config.compaction.keep_last);
            let _ = self.memory.compact_context(&self.session_id, compacted).await;
            return;
        }
        let (summary_request, recent) = compact_session(&history, self.config.compaction.keep_last);
        let mut request = CompletionRequest::new(self.session_id.clone(), vec![summary_request]);
        request.stream = false;
        let summary = match self.provider.complete(request).await {
            Ok(mut stream) => {
                let mut text = String::new();
                while let Some(Ok(event)) = stream.next().await {
                    if let agent_model::ResponseEvent::TextDelta { content, .. } = event {
                        text.push_str(&content);
                    }
                }
                text
            }
            Err(_) => {
                let compacted = emergency_compact(&history, self.config.compaction.keep_last);
                let _ = self.memory.compact_context(&self.session_id, compacted).await;
                return;
            }
        };
        let mut compacted = vec![Message::assistant(uuid::Uuid::new_v4().to_string(), summary)];
        compacted.extend(recent);
        let _ = self.memory.compact_context(&self.session_id, compacted).await;
    }

    /// Sleeps in short slices, polling for cancellation so an in-progress
    /// retry backoff can be aborted promptly rather than running to completion.
    async fn cancellable_sleep(&self, duration: Duration) {
        let poll = Duration::from_millis(20);
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if self.cancellation.is_cancelled() {
                return;
            }
            let step = poll.min(remaining);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }

    async fn fail(&self, code: FailureCode, message: impl Into<String>, loop_count: u32, retry_count: u32) -> ExecutionResult {
        let message = message.into();
        self.finish(AgentStatus::Failed, None, Some(ClassifiedError::new(code, message)), loop_count, retry_count).await
    }

    async fn finish(&self, status: AgentStatus, final_message: Option<String>, failure: Option<ClassifiedError>, loop_count: u32, retry_count: u32) -> ExecutionResult {
        let status_message = failure.as_ref().map(|f| f.user_message.clone()).unwrap_or_else(|| "done".to_string());
        self.emitter.emit_status(status, status_message, None).await;
        if let Some(err) = &failure {
            self.emitter.emit_error(format!("{:?}", err.code), err.user_message.clone(), None).await;
        }
        ExecutionResult { session_id: self.session_id.clone(), status, final_message, failure, loop_count, retry_count }
    }
}
