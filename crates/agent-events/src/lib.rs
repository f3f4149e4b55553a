mod emitter;
mod event;

pub use emitter::{Clock, Emitter, SystemClock};
pub use event::{AgentStatus, Event, EventPayload, Usage, ToolResultStatus};
