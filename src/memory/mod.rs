//! 记忆层：界面消息日志

pub mod conversation;

pub use conversation::{Message, MessageLog, Role, SharedMessageLog, TurnHandle};
