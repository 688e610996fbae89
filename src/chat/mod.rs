//! 对话引擎：会话管理、上下文快照、流式回合协调、晨间简报

pub mod briefing;
pub mod context;
pub mod coordinator;
pub mod events;
pub mod session;

pub use briefing::{morning_briefing, BRIEFING_FALLBACK, BRIEFING_UNAVAILABLE};
pub use context::build_context;
pub use coordinator::{Turn, TurnTimeouts, ERROR_PREFIX};
pub use events::{MessageUpdate, MessageUpdates};
pub use session::{SessionManager, UNAVAILABLE_MESSAGE};
