//! 引擎错误类型
//!
//! 所有失败都在离发生点最近的边界被转换：工具相关错误变为 ToolResult 的 error 负载，
//! 会话 / 传输相关错误变为一条终止性的助手消息，绝不从 `send` 边界逃逸。

use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

/// 对话引擎内部的错误分类
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 无法建立会话句柄（如缺少 API Key），下次 send 时会重新尝试
    #[error("Assistant unavailable: {0}")]
    Unavailable(String),

    /// 远端流在回合中途失败
    #[error("Transport error: {0}")]
    Transport(String),

    /// 远端往返或工具执行超过时限
    #[error("Timed out: {0}")]
    Timeout(String),

    /// 工具处理器失败或领域存储拒绝变更
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// 模型请求了注册表之外的工具；负载文本固定为 "unknown tool"
    #[error("unknown tool")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl From<LlmError> for EngineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingCredentials => EngineError::Unavailable(err.to_string()),
            other => EngineError::Transport(other.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::ToolExecution(err.to_string())
    }
}
