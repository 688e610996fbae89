//! 消息日志：界面渲染的有序消息列表
//!
//! 只追加、不重排、不去重；同一时刻至多一条助手消息处于 streaming 状态。
//! SharedMessageLog 在每次变更后把完整列表推送到 watch 通道，渲染层订阅即可。

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// 仅回合中正在增长的助手消息为 true
    pub streaming: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), false)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into(), false)
    }

    fn new(role: Role, text: String, streaming: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            created_at: Utc::now(),
            streaming,
        }
    }
}

/// 打开中的助手条目；finalize 时被消耗
#[derive(Debug, PartialEq, Eq)]
pub struct TurnHandle {
    id: Uuid,
}

impl TurnHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    open: Option<Uuid>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> Message {
        self.push(Message::user(text))
    }

    /// 追加一条完整的助手消息（欢迎语、提示、错误）
    pub fn append_assistant(&mut self, text: impl Into<String>) -> Message {
        self.push(Message::assistant(text))
    }

    /// 打开一条空的 streaming 助手消息
    ///
    /// # Panics
    /// 已有打开的回合时 panic：同一日志上不允许交错的回合。
    pub fn begin_assistant_turn(&mut self) -> TurnHandle {
        assert!(
            self.open.is_none(),
            "an assistant turn is already streaming"
        );
        let message = self.push(Message::new(Role::Assistant, String::new(), true));
        self.open = Some(message.id);
        TurnHandle { id: message.id }
    }

    /// 向打开的条目追加文本，返回更新后的快照；句柄已失效时返回 None
    pub fn append_delta(&mut self, handle: &TurnHandle, delta: &str) -> Option<Message> {
        if self.open != Some(handle.id) {
            return None;
        }
        let message = self.find_mut(handle.id)?;
        message.text.push_str(delta);
        Some(message.clone())
    }

    /// 结束回合：streaming 置 false
    pub fn finalize(&mut self, handle: TurnHandle) -> Option<Message> {
        if self.open == Some(handle.id) {
            self.open = None;
        }
        let message = self.find_mut(handle.id)?;
        message.streaming = false;
        Some(message.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_open_turn(&self) -> bool {
        self.open.is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: Message) -> Message {
        self.messages.push(message.clone());
        message
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }
}

/// 可在会话管理器、回合与渲染层之间共享的日志
#[derive(Clone)]
pub struct SharedMessageLog {
    inner: Arc<Mutex<MessageLog>>,
    tx: Arc<watch::Sender<Vec<Message>>>,
}

impl SharedMessageLog {
    pub fn new(log: MessageLog) -> Self {
        let (tx, _rx) = watch::channel(log.messages().to_vec());
        Self {
            inner: Arc::new(Mutex::new(log)),
            tx: Arc::new(tx),
        }
    }

    /// 订阅完整消息列表；每次变更推送一次
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.read(|log| log.messages().to_vec())
    }

    pub fn append_user(&self, text: impl Into<String>) -> Message {
        self.update(|log| log.append_user(text))
    }

    pub fn append_assistant(&self, text: impl Into<String>) -> Message {
        self.update(|log| log.append_assistant(text))
    }

    /// 见 [`MessageLog::begin_assistant_turn`]；返回句柄与初始的空消息
    pub fn begin_assistant_turn(&self) -> (TurnHandle, Message) {
        self.update(|log| {
            let handle = log.begin_assistant_turn();
            let message = log
                .get(handle.id)
                .cloned()
                .unwrap_or_else(|| Message::new(Role::Assistant, String::new(), true));
            (handle, message)
        })
    }

    pub fn append_delta(&self, handle: &TurnHandle, delta: &str) -> Option<Message> {
        self.update(|log| log.append_delta(handle, delta))
    }

    pub fn finalize(&self, handle: TurnHandle) -> Option<Message> {
        self.update(|log| log.finalize(handle))
    }

    fn read<R>(&self, f: impl FnOnce(&MessageLog) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn update<R>(&self, f: impl FnOnce(&mut MessageLog) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut guard);
        self.tx.send_replace(guard.messages().to_vec());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_lifecycle() {
        let mut log = MessageLog::new();
        log.append_user("hello");
        let handle = log.begin_assistant_turn();
        assert!(log.has_open_turn());

        log.append_delta(&handle, "Hi");
        let updated = log.append_delta(&handle, " there").unwrap();
        assert_eq!(updated.text, "Hi there");
        assert!(updated.streaming);

        let done = log.finalize(handle).unwrap();
        assert_eq!(done.text, "Hi there");
        assert!(!done.streaming);
        assert!(!log.has_open_turn());
        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[0].role, Role::User);
    }

    #[test]
    #[should_panic(expected = "already streaming")]
    fn test_second_open_turn_panics() {
        let mut log = MessageLog::new();
        let _first = log.begin_assistant_turn();
        let _second = log.begin_assistant_turn();
    }

    #[test]
    fn test_stale_handle_is_ignored() {
        let mut log = MessageLog::new();
        let handle = log.begin_assistant_turn();
        let stale = TurnHandle { id: handle.id() };
        log.finalize(handle);
        assert!(log.append_delta(&stale, "late").is_none());
        assert_eq!(log.messages()[0].text, "");
    }

    #[test]
    fn test_shared_log_publishes_snapshots() {
        let shared = SharedMessageLog::new(MessageLog::new());
        let mut rx = shared.subscribe();
        shared.append_assistant("welcome");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        let (handle, empty) = shared.begin_assistant_turn();
        assert!(empty.streaming);
        shared.append_delta(&handle, "ok");
        shared.finalize(handle);

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].text, "ok");
        assert_eq!(snapshot.iter().filter(|m| m.streaming).count(), 0);
    }
}
