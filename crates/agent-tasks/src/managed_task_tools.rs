use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_memory::ManagedTaskStatus;
use agent_tools::{Tool, ToolCall, ToolExecutionContext, ToolResult};

use crate::managed_tasks::{ManagedTaskStore, TaskUpdate};

fn status_from_str(s: &str) -> Option<ManagedTaskStatus> {
    match s {
        "pending" => Some(ManagedTaskStatus::Pending),
        "in_progress" => Some(ManagedTaskStatus::InProgress),
        "completed" => Some(ManagedTaskStatus::Completed),
        "deleted" => Some(ManagedTaskStatus::Deleted),
        _ => None,
    }
}

fn ids_from_array(value: Option<&Value>) -> Vec<String> {
    value.and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect()).unwrap_or_default()
}

pub struct TaskCreateTool {
    store: Arc<ManagedTaskStore>,
}

impl TaskCreateTool {
    pub fn new(store: Arc<ManagedTaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskCreateTool {
    fn name(&self) -> &str {
        "task_create"
    }

    fn description(&self) -> &str {
        "Creates a tracked task in the current session's managed task list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": { "type": "string" },
                "description": { "type": "string" },
                "active_form": { "type": "string", "description": "Present-continuous label shown while in progress" },
                "metadata": { "type": "object" }
            },
            "required": ["subject"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let Some(subject) = call.args.get("subject").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'subject'");
        };
        let description = call.args.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let active_form = call.args.get("active_form").and_then(|v| v.as_str()).unwrap_or(subject).to_string();
        let metadata: BTreeMap<String, Value> = call.args.get("metadata").and_then(|v| v.as_object()).map(|m| m.clone().into_iter().collect()).unwrap_or_default();

        match self.store.create(&ctx.session_id, subject.to_string(), description, active_form, metadata).await {
            Ok(task) => ToolResult::ok(&call.call_id, serde_json::to_string(&task).unwrap_or_default()),
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

pub struct TaskGetTool {
    store: Arc<ManagedTaskStore>,
}

impl TaskGetTool {
    pub fn new(store: Arc<ManagedTaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskGetTool {
    fn name(&self) -> &str {
        "task_get"
    }

    fn description(&self) -> &str {
        "Fetches one tracked task by id."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "id": { "type": "string" } }, "required": ["id"] })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let Some(id) = call.args.get("id").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'id'");
        };
        match self.store.get(&ctx.session_id, id).await {
            Ok(task) => ToolResult::ok(&call.call_id, serde_json::to_string(&task).unwrap_or_default()),
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

pub struct TaskListTool {
    store: Arc<ManagedTaskStore>,
}

impl TaskListTool {
    pub fn new(store: Arc<ManagedTaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "Lists every tracked task in the current session, including deleted ones."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        match self.store.list(&ctx.session_id).await {
            Ok(tasks) => ToolResult::ok(&call.call_id, serde_json::to_string(&tasks).unwrap_or_default()),
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

pub struct TaskUpdateTool {
    store: Arc<ManagedTaskStore>,
}

impl TaskUpdateTool {
    pub fn new(store: Arc<ManagedTaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskUpdateTool {
    fn name(&self) -> &str {
        "task_update"
    }

    fn description(&self) -> &str {
        "Updates a tracked task's status, fields, metadata, or dependency links. \
         A metadata value of null deletes that key. Deletion is `status: \"deleted\"`."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "deleted"] },
                "subject": { "type": "string" },
                "description": { "type": "string" },
                "active_form": { "type": "string" },
                "owner": { "type": "string" },
                "metadata": { "type": "object" },
                "add_blocks": { "type": "array", "items": { "type": "string" } },
                "add_blocked_by": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let Some(id) = call.args.get("id").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.call_id, "missing 'id'");
        };

        let status = match call.args.get("status").and_then(|v| v.as_str()) {
            Some(s) => match status_from_str(s) {
                Some(status) => Some(status),
                None => return ToolResult::err(&call.call_id, format!("unknown status: {s}")),
            },
            None => None,
        };

        let patch = TaskUpdate {
            status,
            subject: call.args.get("subject").and_then(|v| v.as_str()).map(String::from),
            description: call.args.get("description").and_then(|v| v.as_str()).map(String::from),
            active_form: call.args.get("active_form").and_then(|v| v.as_str()).map(String::from),
            owner: call.args.get("owner").and_then(|v| v.as_str()).map(String::from),
            metadata: call.args.get("metadata").and_then(|v| v.as_object()).map(|m| m.clone().into_iter().collect()),
            add_blocks: ids_from_array(call.args.get("add_blocks")),
            add_blocked_by: ids_from_array(call.args.get("add_blocked_by")),
        };

        match self.store.update(&ctx.session_id, id, patch).await {
            Ok(task) => ToolResult::ok(&call.call_id, serde_json::to_string(&task).unwrap_or_default()),
            Err(e) => ToolResult::err(&call.call_id, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_memory::InMemoryMemory;
    use agent_tools::CancellationSignal;
    use std::path::PathBuf;

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext { session_id: "s1".to_string(), working_directory: PathBuf::from("."), cancellation: CancellationSignal::new() }
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { call_id: "c1".to_string(), tool_name: "task_create".to_string(), args }
    }

    #[tokio::test]
    async fn create_then_list_then_update_round_trip() {
        let store = Arc::new(ManagedTaskStore::new(InMemoryMemory::new()));
        let create = TaskCreateTool::new(store.clone());
        let out = create.execute(&call(json!({"subject": "write tests"})), &ctx()).await;
        assert!(out.success);
        let created: Value = serde_json::from_str(&out.output).unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let list = TaskListTool::new(store.clone());
        let out = list.execute(&call(json!({})), &ctx()).await;
        let tasks: Vec<Value> = serde_json::from_str(&out.output).unwrap();
        assert_eq!(tasks.len(), 1);

        let update = TaskUpdateTool::new(store.clone());
        let out = update.execute(&call(json!({"id": id, "status": "in_progress"})), &ctx()).await;
        assert!(out.success);
        let updated: Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(updated["status"], "in_progress");

        let get = TaskGetTool::new(store);
        let out = get.execute(&call(json!({"id": id})), &ctx()).await;
        assert!(out.success);
    }

    #[tokio::test]
    async fn get_missing_task_is_an_error() {
        let store = Arc::new(ManagedTaskStore::new(InMemoryMemory::new()));
        let get = TaskGetTool::new(store);
        let out = get.execute(&call(json!({"id": "999"})), &ctx()).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn update_rejects_unknown_status_string() {
        let store = Arc::new(ManagedTaskStore::new(InMemoryMemory::new()));
        let create = TaskCreateTool::new(store.clone());
        let out = create.execute(&call(json!({"subject": "x"})), &ctx()).await;
        let created: Value = serde_json::from_str(&out.output).unwrap();

        let update = TaskUpdateTool::new(store);
        let out = update.execute(&call(json!({"id": created["id"], "status": "bogus"})), &ctx()).await;
        assert!(!out.success);
    }
}
