use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("TASK_NOT_FOUND: {0}")]
    NotFound(String),

    #[error("maximum sub-agent nesting depth reached")]
    DepthExceeded,

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: agent_memory::ManagedTaskStatus, to: agent_memory::ManagedTaskStatus },

    #[error("a task cannot depend on itself")]
    SelfDependency,

    #[error("dependency {0} would create a cycle")]
    CircularDependency(String),

    #[error("unknown dependency id: {0}")]
    UnknownDependency(String),

    #[error(transparent)]
    Memory(#[from] agent_memory::MemoryError),
}
