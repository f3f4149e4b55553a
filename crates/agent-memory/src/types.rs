use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskMode {
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Queued,
    Running,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl SubTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The persisted snapshot of a sub-task run. Kept deliberately small — the
/// full transcript lives on the child session, not inlined here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskRunRecord {
    pub run_id: String,
    pub parent_session_id: String,
    pub child_session_id: String,
    pub mode: SubTaskMode,
    pub status: SubTaskStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_activity_at: i64,
    pub last_tool_name: Option<String>,
    pub description: String,
    pub prompt: String,
    pub subagent_type: Option<String>,
    pub model_hint: Option<String>,
    pub turns: u32,
    pub tools_used: Vec<String>,
    pub message_count: u32,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl SubTaskRunRecord {
    pub fn new(run_id: impl Into<String>, parent_session_id: impl Into<String>, child_session_id: impl Into<String>, mode: SubTaskMode, description: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            run_id: run_id.into(),
            parent_session_id: parent_session_id.into(),
            child_session_id: child_session_id.into(),
            mode,
            status: SubTaskStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            last_activity_at: now,
            last_tool_name: None,
            description: description.into(),
            prompt: prompt.into(),
            subagent_type: None,
            model_hint: None,
            turns: 0,
            tools_used: Vec::new(),
            message_count: 0,
            output: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManagedTaskStatus {
    Pending,
    InProgress,
    Completed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedTaskRecord {
    pub id: String,
    pub subject: String,
    pub description: String,
    pub active_form: String,
    pub status: ManagedTaskStatus,
    pub owner: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
