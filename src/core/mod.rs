//! 核心层：错误分类、回合阶段、会话监管

pub mod error;
pub mod session_supervisor;
pub mod state;

pub use error::EngineError;
pub use session_supervisor::SessionSupervisor;
pub use state::TurnPhase;
