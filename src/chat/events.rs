//! 推送给渲染层的消息更新

use std::pin::Pin;

use futures_util::Stream;
use serde::Serialize;

use crate::memory::Message;

/// 一条消息的最新快照：新增或文本增长时各发一次
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageUpdate {
    pub message: Message,
}

impl MessageUpdate {
    pub fn new(message: Message) -> Self {
        Self { message }
    }
}

/// `SessionManager::send` 返回的更新流；丢弃即放弃当前回合
pub type MessageUpdates = Pin<Box<dyn Stream<Item = MessageUpdate> + Send>>;
