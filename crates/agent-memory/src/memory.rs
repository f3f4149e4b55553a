use async_trait::async_trait;

use agent_model::Message;

use crate::error::MemoryError;
use crate::types::{ManagedTaskRecord, SubTaskRunRecord};

/// Session/sub-task-run/managed-task persistence, consumed by the loop
/// engine and sub-task runtime. Implementations own the actual storage
/// (filesystem, database, ...); this crate only fixes the contract.
#[async_trait]
pub trait Memory: Send + Sync {
    async fn initialize(&self) -> Result<(), MemoryError>;
    async fn close(&self) -> Result<(), MemoryError>;
    async fn wait_for_initialization(&self) -> Result<(), MemoryError>;

    async fn create_session(&self, session_id: &str, system_prompt: Option<String>) -> Result<(), MemoryError>;
    async fn get_current_context(&self, session_id: &str) -> Result<Vec<Message>, MemoryError>;
    async fn add_message_to_context(&self, session_id: &str, message: Message) -> Result<(), MemoryError>;
    async fn get_full_history(&self, session_id: &str) -> Result<Vec<Message>, MemoryError>;

    /// Atomically replaces a session's non-system message list, used by
    /// compaction to collapse older history into a summary. The session's
    /// system prompt (set at `create_session`) is untouched.
    async fn compact_context(&self, session_id: &str, messages: Vec<Message>) -> Result<(), MemoryError>;

    async fn save_sub_task_run(&self, run: SubTaskRunRecord) -> Result<(), MemoryError>;
    async fn get_sub_task_run(&self, run_id: &str) -> Result<Option<SubTaskRunRecord>, MemoryError>;
    async fn query_sub_task_runs(&self, parent_session_id: Option<&str>) -> Result<Vec<SubTaskRunRecord>, MemoryError>;

    async fn query_tasks(&self, session_id: &str) -> Result<Vec<ManagedTaskRecord>, MemoryError>;
    async fn save_task(&self, session_id: &str, task: ManagedTaskRecord) -> Result<(), MemoryError>;
    async fn delete_task(&self, session_id: &str, task_id: &str) -> Result<(), MemoryError>;
}
