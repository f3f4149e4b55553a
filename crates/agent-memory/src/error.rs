use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
