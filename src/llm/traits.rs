//! 远端对话后端抽象
//!
//! ChatBackend 负责建立会话（缺凭据时失败）与一次性补全；Conversation 是会话句柄，
//! 持有远端累积的对话历史，send_stream 提交用户文本或工具结果并返回片段流。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::llm::{Fragment, TurnInput};

/// 片段流：按到达顺序产出，远端无更多输出时结束
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, LlmError>> + Send>>;

/// 后端层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API key not configured")]
    MissingCredentials,

    #[error("request failed: {0}")]
    Request(String),

    #[error("stream failed: {0}")]
    Stream(String),
}

/// 对话后端：建立会话句柄、非流式补全（晨间简报等一次性请求）
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 建立新的会话句柄；缺少凭据时返回 MissingCredentials
    async fn start_conversation(&self) -> Result<Box<dyn Conversation>, LlmError>;

    /// 非流式完成，不带工具、不进入任何会话历史
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// 会话句柄：远端侧的累积对话，同一时刻只能有一次 send_stream 在途
#[async_trait]
pub trait Conversation: Send {
    async fn send_stream(&mut self, input: TurnInput) -> Result<FragmentStream, LlmError>;
}
