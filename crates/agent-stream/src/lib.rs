mod driver;
mod reduce;
mod state;
mod update;

pub use driver::StreamAdapter;
pub use reduce::reduce;
pub use state::{AdapterState, AssistantText, TextStatus, ToolInvocation};
pub use update::ConversationUpdate;
