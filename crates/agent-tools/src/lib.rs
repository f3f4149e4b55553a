mod registry;
mod sanitize;
mod tool;

pub use registry::{ToolRegistry, ToolSchema};
pub use sanitize::{NoopSanitizer, RegexSanitizer, SanitizationPolicy};
pub use tool::{CancellationSignal, OutputCategory, Tool, ToolCall, ToolExecutionContext, ToolResult};
