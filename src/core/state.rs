//! 回合阶段：流式响应协调器的显式状态机标签
//!
//! Opening -> Streaming -> (AwaitingToolResults -> Opening -> Streaming)* -> Finalized | Failed

use serde::Serialize;

/// 单个回合所处阶段（可序列化供 UI 展示「思考中 / 执行工具中」等）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// 正在向远端提交用户消息或工具结果
    Opening,
    /// 正在消费片段流
    Streaming,
    /// 片段中含工具请求，等待本批工具全部返回
    AwaitingToolResults,
    /// 正常结束（含被调用方放弃）
    Finalized,
    /// 传输错误或超时导致的终止
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::Finalized | TurnPhase::Failed)
    }
}
