use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_events::Emitter;
use agent_tools::{Tool, ToolCall, ToolExecutionContext, ToolResult};

use crate::runner::{SpawnRequest, SubTaskRunner};

/// Dispatchable `task` tool: spawns a sub-agent (foreground or background)
/// to complete a focused prompt. Never register this tool into a sub-task
/// runner's own child registry — that omission, not the depth counter
/// alone, is what bounds nesting.
pub struct TaskTool {
    runner: Arc<SubTaskRunner>,
    emitter: Arc<Emitter>,
    depth: usize,
}

impl TaskTool {
    pub fn new(runner: Arc<SubTaskRunner>, emitter: Arc<Emitter>, depth: usize) -> Self {
        Self { runner, emitter, depth }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Spawn a sub-agent to complete a focused task. Runs in the foreground by default \
         (blocks until the sub-agent finishes and returns its final output) or in the \
         background when `background: true` (returns a run id immediately; poll with \
         `task_output` and stop with `task_stop`). Maximum nesting depth is 3."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short label for the sub-task, shown in run listings"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task prompt for the sub-agent"
                },
                "subagent_type": {
                    "type": "string",
                    "description": "Optional named sub-agent persona"
                },
                "model": {
                    "type": "string",
                    "description": "Optional model routing hint, resolved against configured aliases"
                },
                "background": {
                    "type": "boolean",
                    "description": "Run without blocking; defaults to false"
                }
            },
            "required": ["description", "prompt"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let Some(description) = call.args.get("description").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'description'");
        };
        let Some(prompt) = call.args.get("prompt").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'prompt'");
        };
        let subagent_type = call.args.get("subagent_type").and_then(|v| v.as_str()).map(String::from);
        let model_hint = call.args.get("model").and_then(|v| v.as_str()).map(String::from);
        let background = call.args.get("background").and_then(|v| v.as_bool()).unwrap_or(false);

        let req = SpawnRequest {
            parent_session_id: ctx.session_id.clone(),
            description: description.to_string(),
            prompt: prompt.to_string(),
            subagent_type,
            model_hint,
            background,
            depth: self.depth,
        };

        match self.runner.spawn(self.emitter.clone(), req).await {
            Ok(record) if background => ToolResult::ok(&call.call_id, format!("spawned background run {}", record.run_id)).with_metadata(json!({"run_id": record.run_id})),
            Ok(record) => match record.output {
                Some(output) => ToolResult::ok(&call.call_id, output),
                None => ToolResult::err(&call.call_id, record.error.unwrap_or_else(|| "sub-agent produced no output".to_string())),
            },
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

pub struct TaskOutputTool {
    runner: Arc<SubTaskRunner>,
}

impl TaskOutputTool {
    pub fn new(runner: Arc<SubTaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for TaskOutputTool {
    fn name(&self) -> &str {
        "task_output"
    }

    fn description(&self) -> &str {
        "Reads the current status and output of a background sub-task run, identified by run id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "run_id": { "type": "string" },
                "block": { "type": "boolean", "description": "Wait for a terminal status before returning" }
            },
            "required": ["run_id"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
        let Some(run_id) = call.args.get("run_id").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'run_id'");
        };
        let block = call.args.get("block").and_then(|v| v.as_bool()).unwrap_or(false);

        match self.runner.output(run_id, block).await {
            Ok(record) => match serde_json::to_value(&record) {
                Ok(value) => ToolResult::ok(&call.call_id, value.to_string()).with_metadata(value),
                Err(e) => ToolResult::err(&call.call_id, e.to_string()),
            },
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

pub struct TaskStopTool {
    runner: Arc<SubTaskRunner>,
}

impl TaskStopTool {
    pub fn new(runner: Arc<SubTaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for TaskStopTool {
    fn name(&self) -> &str {
        "task_stop"
    }

    fn description(&self) -> &str {
        "Requests cancellation of a background sub-task run, waiting briefly for a graceful stop."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "run_id": { "type": "string" } },
            "required": ["run_id"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
        let Some(run_id) = call.args.get("run_id").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'run_id'");
        };
        match self.runner.stop(run_id).await {
            Ok(record) => ToolResult::ok(&call.call_id, format!("status: {:?}", record.status)),
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolRegistryFactory;
    use agent_memory::InMemoryMemory;
    use agent_model::{ScriptedMockProvider, ScriptedResponse};
    use agent_tools::{CancellationSignal, NoopSanitizer, ToolRegistry};
    use agent_core::AgentLoopConfig;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext { session_id: "parent".to_string(), working_directory: PathBuf::from("."), cancellation: CancellationSignal::new() }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall { call_id: "c1".to_string(), tool_name: name.to_string(), args }
    }

    fn test_runner(scripts: Vec<ScriptedResponse>) -> (Arc<crate::runner::SubTaskRunner>, Arc<Emitter>) {
        let memory = InMemoryMemory::new();
        let provider = Arc::new(ScriptedMockProvider::new(scripts));
        let factory: ToolRegistryFactory = Arc::new(ToolRegistry::new);
        let runner = Arc::new(crate::runner::SubTaskRunner::new(memory, provider, factory, Arc::new(NoopSanitizer), AgentLoopConfig::default(), Arc::new(AtomicUsize::new(0))));
        let (tx, _rx) = mpsc::channel(64);
        (runner, Arc::new(Emitter::new("parent", tx)))
    }

    #[tokio::test]
    async fn task_tool_requires_description_and_prompt() {
        let (runner, emitter) = test_runner(vec![]);
        let tool = TaskTool::new(runner, emitter, 0);
        let out = tool.execute(&call("task", json!({"prompt": "do it"})), &ctx()).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn task_tool_foreground_returns_sub_agent_text() {
        let (runner, emitter) = test_runner(vec![ScriptedResponse::text("sub-agent result")]);
        let tool = TaskTool::new(runner, emitter, 0);
        let out = tool.execute(&call("task", json!({"description": "d", "prompt": "do it"})), &ctx()).await;
        assert!(out.success);
        assert_eq!(out.output, "sub-agent result");
    }

    #[tokio::test]
    async fn task_tool_background_returns_run_id_then_output_tool_polls_it() {
        let (runner, emitter) = test_runner(vec![ScriptedResponse::text("bg result")]);
        let tool = TaskTool::new(runner.clone(), emitter, 0);
        let out = tool.execute(&call("task", json!({"description": "d", "prompt": "do it", "background": true})), &ctx()).await;
        assert!(out.success);
        let run_id = out.metadata.unwrap()["run_id"].as_str().unwrap().to_string();

        let output_tool = TaskOutputTool::new(runner);
        let out = output_tool.execute(&call("task_output", json!({"run_id": run_id, "block": true})), &ctx()).await;
        assert!(out.success);
        assert!(out.output.contains("bg result"));
    }

    #[tokio::test]
    async fn task_output_unknown_run_id_is_an_error() {
        let (runner, _emitter) = test_runner(vec![]);
        let output_tool = TaskOutputTool::new(runner);
        let out = output_tool.execute(&call("task_output", json!({"run_id": "nope"})), &ctx()).await;
        assert!(!out.success);
    }
}
