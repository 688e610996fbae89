//! 会话监管：回合级取消
//!
//! 每个回合开始时领取一个新的 CancellationToken；UI 关闭或用户点 Stop 时 cancel() 只作用于当前回合，
//! 下一次 send 会拿到新的 token，不会被上一次的取消波及。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新回合发放取消令牌，替换上一回合的令牌
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = Some(token.clone());
        token
    }

    /// 放弃当前回合（若有）
    pub fn cancel(&self) {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = current.as_ref() {
            token.cancel();
        }
    }
}
