use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use agent_model::Message;

use crate::error::MemoryError;
use crate::memory::Memory;
use crate::types::{ManagedTaskRecord, SubTaskRunRecord};

#[derive(Default)]
struct SessionState {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

/// A process-local reference backend: sessions, sub-task runs, and managed
/// tasks all live behind an `RwLock` snapshot-on-read map, mirroring the
/// read-mostly shared-state pattern used elsewhere in the runtime. Suitable
/// for tests and as the default backend when no durable store is wired in.
#[derive(Default)]
pub struct InMemoryMemory {
    sessions: RwLock<HashMap<String, SessionState>>,
    sub_task_runs: RwLock<HashMap<String, SubTaskRunRecord>>,
    managed_tasks: RwLock<HashMap<String, HashMap<String, ManagedTaskRecord>>>,
}

impl InMemoryMemory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Memory for InMemoryMemory {
    async fn initialize(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn wait_for_initialization(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn create_session(&self, session_id: &str, system_prompt: Option<String>) -> Result<(), MemoryError> {
        self.sessions.write().await.insert(session_id.to_string(), SessionState { system_prompt, messages: Vec::new() });
        Ok(())
    }

    async fn get_current_context(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let sessions = self.sessions.read().await;
        let state = sessions.get(session_id).ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        let mut out = Vec::new();
        if let Some(sys) = &state.system_prompt {
            out.push(Message::system("system", sys.clone()));
        }
        out.extend(state.messages.iter().filter(|m| !m.excluded_from_context).cloned());
        Ok(out)
    }

    async fn add_message_to_context(&self, session_id: &str, message: Message) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let state = sessions.get_mut(session_id).ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        state.messages.push(message);
        Ok(())
    }

    async fn get_full_history(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let sessions = self.sessions.read().await;
        let state = sessions.get(session_id).ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        Ok(state.messages.clone())
    }

    async fn compact_context(&self, session_id: &str, messages: Vec<Message>) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let state = sessions.get_mut(session_id).ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        state.messages = messages;
        Ok(())
    }

    async fn save_sub_task_run(&self, run: SubTaskRunRecord) -> Result<(), MemoryError> {
        self.sub_task_runs.write().await.insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn get_sub_task_run(&self, run_id: &str) -> Result<Option<SubTaskRunRecord>, MemoryError> {
        Ok(self.sub_task_runs.read().await.get(run_id).cloned())
    }

    async fn query_sub_task_runs(&self, parent_session_id: Option<&str>) -> Result<Vec<SubTaskRunRecord>, MemoryError> {
        let runs = self.sub_task_runs.read().await;
        let mut out: Vec<SubTaskRunRecord> = runs
            .values()
            .filter(|r| parent_session_id.map(|p| p == r.parent_session_id).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn query_tasks(&self, session_id: &str) -> Result<Vec<ManagedTaskRecord>, MemoryError> {
        let tasks = self.managed_tasks.read().await;
        let mut out: Vec<ManagedTaskRecord> = tasks.get(session_id).map(|m| m.values().cloned().collect()).unwrap_or_default();
        out.sort_by_key(|t| t.id.parse::<u64>().unwrap_or(u64::MAX));
        Ok(out)
    }

    async fn save_task(&self, session_id: &str, task: ManagedTaskRecord) -> Result<(), MemoryError> {
        let mut tasks = self.managed_tasks.write().await;
        tasks.entry(session_id.to_string()).or_default().insert(task.id.clone(), task);
        Ok(())
    }

    async fn delete_task(&self, session_id: &str, task_id: &str) -> Result<(), MemoryError> {
        let mut tasks = self.managed_tasks.write().await;
        if let Some(session_tasks) = tasks.get_mut(session_id) {
            session_tasks.remove(task_id);
        }
        Ok(())
    }
}
