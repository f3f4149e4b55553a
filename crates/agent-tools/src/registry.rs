use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tool::{Tool, ToolCall, ToolExecutionContext, ToolResult};

/// A tool schema in the shape handed to providers. Kept independent of
/// `agent-model::ToolSchema` so this crate never depends on the model crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry of tools available to a loop engine instance.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Upper bound on concurrently in-flight tool executions within one batch.
    parallelism: usize,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new(), parallelism: 8 }
    }

    pub fn with_parallelism(parallelism: usize) -> Self {
        Self { tools: HashMap::new(), parallelism: parallelism.max(1) }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn to_llm_tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch a batch of tool calls concurrently (bounded by `parallelism`)
    /// and return results in the **same order as the input**, regardless of
    /// completion order, so the resulting conversation stays deterministic.
    pub async fn execute_batch(&self, calls: &[ToolCall], ctx: &ToolExecutionContext) -> Vec<ToolResult> {
        use tokio::sync::Semaphore;
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut handles = Vec::with_capacity(calls.len());

        for call in calls {
            let tool = self.tools.get(&call.tool_name).cloned();
            let call = call.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                match tool {
                    Some(tool) => tool.execute(&call, &ctx).await,
                    None => {
                        warn!(tool = %call.tool_name, "unknown tool requested");
                        ToolResult::err(&call.call_id, format!("unknown tool: {}", call.tool_name))
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (call, handle) in calls.iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => results.push(ToolResult::err(
                    &call.call_id,
                    format!("tool task panicked: {join_err}"),
                )),
            }
        }
        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::tool::CancellationSignal;

    struct DelayedTool {
        delay_ms: u64,
        order: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for DelayedTool {
        fn name(&self) -> &str {
            "delayed"
        }
        fn description(&self) -> &str {
            "sleeps then records completion order"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.order.lock().unwrap().push(call.call_id.clone());
            ToolResult::ok(&call.call_id, "done")
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
    async fn execute_batch_preserves_input_order_despite_completion_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut reg = ToolRegistry::new();
        reg.register(DelayedTool { delay_ms: 30, order: order.clone() });
        // Only one tool name registered, but call it multiple times with
        // different delays to show result ordering is by input, not completion.
        let calls = vec![
            ToolCall { call_id: "slow".into(), tool_name: "delayed".into(), args: json!({}) },
            ToolCall { call_id: "fast".into(), tool_name: "delayed".into(), args: json!({}) },
        ];
        let results = reg.execute_batch(&calls, &ctx()).await;
        assert_eq!(results[0].call_id, "slow");
        assert_eq!(results[1].call_id, "fast");
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_result() {
        let reg = ToolRegistry::new();
        let calls = vec![ToolCall { call_id: "x".into(), tool_name: "missing".into(), args: json!({}) }];
        let results = reg.execute_batch(&calls, &ctx()).await;
        assert!(!results[0].success);
        assert!(results[0].error.as_ref().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn parallelism_bound_limits_concurrency() {
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        struct TrackingTool {
            concurrent: Arc<AtomicU32>,
            max_seen: Arc<AtomicU32>,
        }
        #[async_trait]
        impl Tool for TrackingTool {
            fn name(&self) -> &str {
                "track"
            }
            fn description(&self) -> &str {
                "tracks concurrency"
            }
            fn parameters_schema(&self) -> Value {
                json!({})
            }
            async fn execute(&self, call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
                let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                ToolResult::ok(&call.call_id, "ok")
            }
        }

        let mut reg = ToolRegistry::with_parallelism(2);
        reg.register(TrackingTool { concurrent: concurrent.clone(), max_seen: max_seen.clone() });
        let calls: Vec<ToolCall> = (0..6)
            .map(|i| ToolCall { call_id: i.to_string(), tool_name: "track".into(), args: json!({}) })
            .collect();
        reg.execute_batch(&calls, &ctx()).await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
