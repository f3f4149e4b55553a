use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use agent_core::{AgentLoop, AgentLoopConfig, ExecutionResult};
use agent_events::{AgentStatus as CoreAgentStatus, Emitter};
use agent_memory::{now_ms, Memory, SubTaskMode, SubTaskRunRecord, SubTaskStatus};
use agent_model::{Message, ModelProvider};
use agent_tools::{CancellationSignal, SanitizationPolicy, ToolRegistry};

use crate::error::TaskError;
use crate::model_routing::resolve_model_hint;

/// Sub-agent nesting is capped at this many levels below the root session.
pub const MAX_DEPTH: usize = 3;

/// Builds a fresh tool registry for a child session. Implementations must
/// never register the `task` tool into the registry they return — that
/// omission, not the depth counter alone, is what makes nesting terminate.
pub type ToolRegistryFactory = Arc<dyn Fn() -> ToolRegistry + Send + Sync>;

struct BackgroundEntry {
    handle: JoinHandle<()>,
    cancellation: CancellationSignal,
}

/// Parameters for one `task(...)` invocation.
pub struct SpawnRequest {
    pub parent_session_id: String,
    pub description: String,
    pub prompt: String,
    pub subagent_type: Option<String>,
    pub model_hint: Option<String>,
    pub background: bool,
    pub depth: usize,
}

/// Drives background and foreground sub-agent runs: spawns a child
/// [`AgentLoop`] under a fresh session id, forwards its events to the
/// parent's emitter wrapped as `subagent_event`, and persists a
/// [`SubTaskRunRecord`] snapshot the parent can poll via `output`.
pub struct SubTaskRunner {
    memory: Arc<dyn Memory>,
    provider: Arc<dyn ModelProvider>,
    tool_registry_factory: ToolRegistryFactory,
    sanitizer: Arc<dyn SanitizationPolicy>,
    config: AgentLoopConfig,
    depth_counter: Arc<AtomicUsize>,
    background: Mutex<HashMap<String, BackgroundEntry>>,
}

impl SubTaskRunner {
    pub fn new(
        memory: Arc<dyn Memory>,
        provider: Arc<dyn ModelProvider>,
        tool_registry_factory: ToolRegistryFactory,
        sanitizer: Arc<dyn SanitizationPolicy>,
        config: AgentLoopConfig,
        depth_counter: Arc<AtomicUsize>,
    ) -> Self {
        Self { memory, provider, tool_registry_factory, sanitizer, config, depth_counter, background: Mutex::new(HashMap::new()) }
    }

    /// Spawns a child run. Foreground runs block until completion and
    /// return the final record; background runs return immediately with a
    /// `Queued`/`Running` record that `output` can poll.
    pub async fn spawn(&self, parent_emitter: Arc<Emitter>, req: SpawnRequest) -> Result<SubTaskRunRecord, TaskError> {
        if req.depth >= MAX_DEPTH {
            return Err(TaskError::DepthExceeded);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let child_session_id = format!("{}::subtask::{}", req.parent_session_id, run_id);
        let mode = if req.background { SubTaskMode::Background } else { SubTaskMode::Foreground };

        let mut record = SubTaskRunRecord::new(run_id.clone(), req.parent_session_id.clone(), child_session_id.clone(), mode, req.description.clone(), req.prompt.clone());
        record.subagent_type = req.subagent_type.clone();
        let (resolved_model, applied) = resolve_model_hint(req.model_hint.as_deref());
        if applied {
            record.model_hint = resolved_model.clone();
        }
        self.memory.create_session(&child_session_id, None).await?;
        self.memory.save_sub_task_run(record.clone()).await?;

        let (child_loop, child_rx) = self.build_child_loop(&child_session_id, resolved_model);
        let child_cancellation = child_loop.cancellation();
        let input = Message::user(uuid::Uuid::new_v4().to_string(), req.prompt.clone());

        let forwarder = tokio::spawn(forward_events(parent_emitter, run_id.clone(), child_session_id.clone(), req.subagent_type.clone(), child_rx));

        if req.background {
            record.status = SubTaskStatus::Running;
            record.started_at = Some(now_ms());
            self.memory.save_sub_task_run(record.clone()).await?;

            let memory = self.memory.clone();
            let run_id_for_task = run_id.clone();
            let handle = tokio::spawn(run_to_completion(memory, child_loop, input, run_id_for_task, forwarder, self.depth_counter.clone()));
            self.background.lock().await.insert(run_id.clone(), BackgroundEntry { handle, cancellation: child_cancellation });
            Ok(record)
        } else {
            record.status = SubTaskStatus::Running;
            record.started_at = Some(now_ms());
            self.memory.save_sub_task_run(record.clone()).await?;
            self.depth_counter.fetch_add(1, Ordering::SeqCst);
            let result = child_loop.execute(input).await;
            self.depth_counter.fetch_sub(1, Ordering::SeqCst);
            drop(child_loop);
            let _ = forwarder.await;
            finalize_record(&self.memory, &run_id, result).await
        }
    }

    fn build_child_loop(&self, child_session_id: &str, resolved_model: Option<String>) -> (AgentLoop, mpsc::Receiver<agent_events::Event>) {
        let (tx, rx) = mpsc::channel(256);
        let child_emitter = Arc::new(Emitter::new(child_session_id.to_string(), tx));
        let tools = Arc::new((self.tool_registry_factory)());
        let agent_loop = AgentLoop::new(child_session_id.to_string(), self.memory.clone(), self.provider.clone(), tools, child_emitter, self.sanitizer.clone(), self.config.clone()).with_model_override(resolved_model);
        (agent_loop, rx)
    }

    /// Polls a run's current status. `block` waits (bounded at 60s) for a
    /// terminal state instead of returning immediately.
    pub async fn output(&self, run_id: &str, block: bool) -> Result<SubTaskRunRecord, TaskError> {
        let deadline = std::time::Instant::now() + Duration::from_secs(60);
        loop {
            let record = self.memory.get_sub_task_run(run_id).await?.ok_or_else(|| TaskError::NotFound(run_id.to_string()))?;
            if !block || record.status.is_terminal() || std::time::Instant::now() >= deadline {
                return Ok(record);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Requests cancellation and waits up to 2s for a graceful stop before
    /// aborting the task outright.
    pub async fn stop(&self, run_id: &str) -> Result<SubTaskRunRecord, TaskError> {
        let entry = self.background.lock().await.remove(run_id);
        let Some(entry) = entry else {
            return self.memory.get_sub_task_run(run_id).await?.ok_or_else(|| TaskError::NotFound(run_id.to_string()));
        };
        entry.cancellation.cancel();

        let graceful = tokio::time::timeout(Duration::from_secs(2), entry.handle).await;
        if graceful.is_err() {
            tracing::warn!(run_id, "sub-task did not stop gracefully within 2s, task remains aborted in background");
        }
        self.memory.get_sub_task_run(run_id).await?.ok_or_else(|| TaskError::NotFound(run_id.to_string()))
    }

    /// Scans persisted runs for ones left `Running`/`Queued` by a prior
    /// process that crashed mid-flight and marks them `Failed`. No retry:
    /// a crashed run's child session state is not trusted to resume from.
    pub async fn recover(&self, parent_session_id: Option<&str>) -> Result<usize, TaskError> {
        let runs = self.memory.query_sub_task_runs(parent_session_id).await?;
        let mut recovered = 0;
        for mut run in runs {
            if !run.status.is_terminal() {
                run.status = SubTaskStatus::Failed;
                run.finished_at = Some(now_ms());
                run.error = Some("interrupted: runtime restarted while this run was in flight".to_string());
                self.memory.save_sub_task_run(run).await?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

async fn run_to_completion(memory: Arc<dyn Memory>, child_loop: AgentLoop, input: Message, run_id: String, forwarder: JoinHandle<()>, depth_counter: Arc<AtomicUsize>) {
    depth_counter.fetch_add(1, Ordering::SeqCst);
    let result = child_loop.execute(input).await;
    depth_counter.fetch_sub(1, Ordering::SeqCst);
    drop(child_loop);
    let _ = forwarder.await;
    let _ = finalize_record(&memory, &run_id, result).await;
}

/// Drains a child session's raw events and re-wraps each one as a
/// `subagent_event` on the parent's stream, so a caller tailing the parent
/// emitter sees the sub-agent's progress live rather than only its final
/// status.
async fn forward_events(parent_emitter: Arc<Emitter>, run_id: String, child_session_id: String, subagent_type: Option<String>, mut child_rx: mpsc::Receiver<agent_events::Event>) {
    while let Some(event) = child_rx.recv().await {
        parent_emitter.emit_subagent_event(run_id.clone(), child_session_id.clone(), subagent_type.clone(), event).await;
    }
}

async fn finalize_record(memory: &Arc<dyn Memory>, run_id: &str, result: ExecutionResult) -> Result<SubTaskRunRecord, TaskError> {
    let mut record = memory.get_sub_task_run(run_id).await?.ok_or_else(|| TaskError::NotFound(run_id.to_string()))?;
    record.finished_at = Some(now_ms());
    record.turns = result.loop_count;
    match result.status {
        CoreAgentStatus::Completed => {
            record.status = SubTaskStatus::Completed;
            record.output = result.final_message;
        }
        CoreAgentStatus::Aborted => {
            record.status = SubTaskStatus::Cancelled;
            record.error = result.failure.map(|f| f.user_message);
        }
        _ => {
            record.status = SubTaskStatus::Failed;
            record.error = result.failure.map(|f| f.user_message).or(Some("sub-task ended without completing".to_string()));
        }
    }
    memory.save_sub_task_run(record.clone()).await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_memory::InMemoryMemory;
    use agent_model::{ScriptedMockProvider, ScriptedResponse};
    use agent_tools::NoopSanitizer;
    use tokio::sync::mpsc;

    fn runner(scripts: Vec<ScriptedResponse>) -> (Arc<SubTaskRunner>, Arc<Emitter>) {
        let memory = InMemoryMemory::new();
        let provider = Arc::new(ScriptedMockProvider::new(scripts));
        let factory: ToolRegistryFactory = Arc::new(ToolRegistry::new);
        let runner = Arc::new(SubTaskRunner::new(memory, provider, factory, Arc::new(NoopSanitizer), AgentLoopConfig::default(), Arc::new(AtomicUsize::new(0))));
        let (tx, _rx) = mpsc::channel(64);
        let emitter = Arc::new(Emitter::new("parent", tx));
        (runner, emitter)
    }

    fn request(background: bool) -> SpawnRequest {
        SpawnRequest {
            parent_session_id: "parent".to_string(),
            description: "do the thing".to_string(),
            prompt: "do the thing".to_string(),
            subagent_type: None,
            model_hint: None,
            background,
            depth: 0,
        }
    }

    #[tokio::test]
    async fn foreground_spawn_blocks_and_returns_completed_output() {
        let (runner, emitter) = runner(vec![ScriptedResponse::text("done")]);
        let record = runner.spawn(emitter, request(false)).await.unwrap();
        assert_eq!(record.status, SubTaskStatus::Completed);
        assert_eq!(record.output.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn background_spawn_returns_immediately_then_completes() {
        let (runner, emitter) = runner(vec![ScriptedResponse::text("done")]);
        let record = runner.spawn(emitter, request(true)).await.unwrap();
        assert_eq!(record.mode, SubTaskMode::Background);

        let finished = runner.output(&record.run_id, true).await.unwrap();
        assert_eq!(finished.status, SubTaskStatus::Completed);
        assert_eq!(finished.output.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn depth_at_cap_is_rejected_without_touching_the_provider() {
        let (runner, emitter) = runner(vec![]);
        let mut req = request(false);
        req.depth = MAX_DEPTH;
        let err = runner.spawn(emitter, req).await.unwrap_err();
        assert!(matches!(err, TaskError::DepthExceeded));
    }

    #[tokio::test]
    async fn stop_cancels_a_running_background_task() {
        let (runner, emitter) = runner(vec![ScriptedResponse::text("done")]);
        let record = runner.spawn(emitter, request(true)).await.unwrap();
        let stopped = runner.stop(&record.run_id).await.unwrap();
        assert!(matches!(stopped.status, SubTaskStatus::Completed | SubTaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn recover_marks_interrupted_runs_as_failed() {
        let memory = InMemoryMemory::new();
        let mut stuck = SubTaskRunRecord::new("r1", "parent", "parent::subtask::r1", SubTaskMode::Background, "d", "p");
        stuck.status = SubTaskStatus::Running;
        memory.save_sub_task_run(stuck).await.unwrap();

        let provider = Arc::new(ScriptedMockProvider::new(vec![]));
        let factory: ToolRegistryFactory = Arc::new(ToolRegistry::new);
        let runner = SubTaskRunner::new(memory.clone(), provider, factory, Arc::new(NoopSanitizer), AgentLoopConfig::default(), Arc::new(AtomicUsize::new(0)));

        let recovered = runner.recover(None).await.unwrap();
        assert_eq!(recovered, 1);
        let record = memory.get_sub_task_run("r1").await.unwrap().unwrap();
        assert_eq!(record.status, SubTaskStatus::Failed);
    }
}
