pub mod call;
pub mod executor;
pub mod registry;
pub mod schema;

pub use call::{RequestedPriority, RequestedStatus, ToolCall, ToolKind};
pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use schema::{tool_declarations, ToolDeclaration};
