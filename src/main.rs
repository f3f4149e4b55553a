//! Reference wiring for the agent runtime: builds every crate's pieces by
//! hand and drives one scripted session end to end, the way an integration
//! test would, but printing to stdout instead of asserting.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agent_core::{AgentLoop, AgentLoopConfig};
use agent_events::Emitter;
use agent_memory::{InMemoryMemory, Memory};
use agent_model::{Message, ScriptedMockProvider, ScriptedResponse};
use agent_stream::{ConversationUpdate, StreamAdapter};
use agent_tasks::{ManagedTaskStore, SubTaskRunner, TaskTool, ToolRegistryFactory};
use agent_tools::{NoopSanitizer, Tool, ToolCall, ToolExecutionContext, ToolRegistry, ToolResult};

/// A stand-in for a real shell/file tool: echoes its `command` argument back
/// as output. Demonstrates the tool-dispatch round trip without touching
/// the filesystem.
struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes the given command string back as output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
        let command = call.args.get("command").and_then(|v| v.as_str()).unwrap_or_default();
        ToolResult::ok(&call.call_id, format!("ran: {command}"))
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(false).with_writer(std::io::stderr)).with(filter).try_init();
}

fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let memory = InMemoryMemory::new();
    memory.create_session("demo-session", Some("You are a careful, concise coding assistant.".to_string())).await?;

    let provider = Arc::new(ScriptedMockProvider::new(vec![
        ScriptedResponse::tool_call("call-1", "echo", r#"{"command": "cargo test"}"#),
        ScriptedResponse::text("The tests passed. Nothing else to report."),
    ]));

    let tools = Arc::new(build_registry());
    let (event_tx, event_rx) = mpsc::channel(256);
    let emitter = Arc::new(Emitter::new("demo-session", event_tx));
    let sanitizer = Arc::new(NoopSanitizer);

    let agent = AgentLoop::new("demo-session".to_string(), memory.clone(), provider.clone(), tools, emitter, sanitizer.clone(), AgentLoopConfig::default());

    let (update_tx, mut update_rx) = mpsc::channel(256);
    let printer = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            print_update(&update, 0);
        }
    });
    let adapter_handle = tokio::spawn(StreamAdapter::new().run(event_rx, update_tx));

    println!("=== running main agent loop ===");
    let result = agent.execute(Message::user("u1", "Run the test suite and summarize the result.")).await;
    drop(agent);
    adapter_handle.await?;
    printer.await?;

    println!("\n=== execute() result ===");
    println!("status: {:?}", result.status);
    println!("loops:  {}", result.loop_count);
    if let Some(msg) = &result.final_message {
        println!("final:  {msg}");
    }

    println!("\n=== managed task list ===");
    let task_store = ManagedTaskStore::new(memory.clone());
    let mut metadata = BTreeMap::new();
    metadata.insert("priority".to_string(), json!("high"));
    let task = task_store.create("demo-session", "Ship the release".to_string(), "Cut and publish v1.0".to_string(), "Shipping the release".to_string(), metadata).await?;
    println!("created task {}: {}", task.id, task.subject);

    println!("\n=== background sub-task ===");
    let sub_provider = Arc::new(ScriptedMockProvider::new(vec![ScriptedResponse::text("Sub-agent: scanned 3 files, no issues found.")]));
    let factory: ToolRegistryFactory = Arc::new(build_registry);
    let depth_counter = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(SubTaskRunner::new(memory.clone(), sub_provider, factory, sanitizer, AgentLoopConfig::default(), depth_counter));

    let (parent_tx, parent_rx) = mpsc::channel(64);
    let parent_emitter = Arc::new(Emitter::new("demo-session", parent_tx));
    let task_tool = TaskTool::new(runner.clone(), parent_emitter, 0);
    let spawn_result = task_tool
        .execute(
            &ToolCall { call_id: "bg-1".to_string(), tool_name: "task".to_string(), args: json!({"description": "lint check", "prompt": "lint the codebase", "background": true}) },
            &ToolExecutionContext { session_id: "demo-session".to_string(), working_directory: PathBuf::from("."), cancellation: agent_tools::CancellationSignal::new() },
        )
        .await;
    println!("spawned: {}", spawn_result.output);
    let run_id = spawn_result.metadata.as_ref().and_then(|m| m["run_id"].as_str()).unwrap_or_default();
    let finished = runner.output(run_id, true).await?;
    println!("background run finished with status {:?}: {}", finished.status, finished.output.unwrap_or_default());
    drop(parent_rx);

    Ok(())
}

fn print_update(update: &ConversationUpdate, depth: usize) {
    let pad = "  ".repeat(depth);
    match update {
        ConversationUpdate::AssistantTextStarted { .. } => {}
        ConversationUpdate::AssistantTextAppended { .. } => {}
        ConversationUpdate::AssistantTextCompleted { content, .. } => println!("{pad}assistant: {content}"),
        ConversationUpdate::ReasoningStarted { .. } | ConversationUpdate::ReasoningAppended { .. } => {}
        ConversationUpdate::ReasoningCompleted { content, .. } => println!("{pad}reasoning: {content}"),
        ConversationUpdate::ToolCallCreated { tool_name, args, .. } => println!("{pad}tool_call: {tool_name}({args})"),
        ConversationUpdate::ToolCallStreamed { .. } => {}
        ConversationUpdate::ToolCallResolved { call_id, status, result, .. } => println!("{pad}tool_result[{call_id}] {status:?}: {result}"),
        ConversationUpdate::CodePatch { path, .. } => println!("{pad}code_patch: {path}"),
        ConversationUpdate::UsageUpdated { usage } => println!("{pad}usage: prompt={} completion={} total={}", usage.prompt, usage.completion, usage.total),
        ConversationUpdate::StatusChanged { state, message } => println!("{pad}status: {state:?} {message}"),
        ConversationUpdate::ErrorRaised { code, message } => println!("{pad}error[{code}]: {message}"),
        ConversationUpdate::SubagentUpdate { task_id, update, .. } => {
            println!("{pad}(task {task_id})");
            print_update(update, depth + 1);
        }
        ConversationUpdate::SessionComplete => println!("{pad}-- session complete --"),
    }
}
