use thiserror::Error;

/// Errors a provider implementation may raise from `complete`.
///
/// Closed taxonomy: the loop engine's classifier branches on `Retryable` vs
/// `Fatal` directly rather than inspecting error message text, matching the
/// "typed error enum + classifier function" strategy chosen over exceptions
/// for retry control flow.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// A transient failure the caller should retry: timeouts, 5xx gateway
    /// errors, or a streamed error chunk carrying a retryable code.
    #[error("[{code}] {message}")]
    Retryable { code: String, message: String },

    /// A failure retrying cannot fix: invalid parameters, malformed request
    /// shape, or a response that never carried usable choices.
    #[error("{message}")]
    Fatal { message: String },
}

impl ProviderError {
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retryable { code: code.into(), message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Retryable { code, .. } => code,
            Self::Fatal { .. } => "fatal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}
