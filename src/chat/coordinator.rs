//! 流式响应协调器：一个回合（可能跨多次远端往返）的显式状态机
//!
//! Opening 提交输入并打开片段流；Streaming 逐个消费片段，文本追加到进行中的助手消息；
//! 片段带工具请求时转入 AwaitingToolResults，按序执行整批请求，把结果提交回同一会话后回到 Opening。
//! 后续流压入栈中，栈空即回合结束。工具片段附带的文本在后续叙述之后再追加。

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::MessageUpdate;
use crate::config::LlmTimeoutsSection;
use crate::core::{EngineError, TurnPhase};
use crate::llm::{Conversation, FragmentStream, ToolInvocationRequest, TurnInput};
use crate::memory::{SharedMessageLog, TurnHandle};
use crate::tools::ToolExecutor;

/// 错误消息前缀
pub const ERROR_PREFIX: &str = "System Error:";

/// 会话槽位：会话管理器独占持有，回合期间以 owned guard 形式借出
pub type ConversationSlot = OwnedMutexGuard<Option<Box<dyn Conversation>>>;

/// 远端往返的时限
#[derive(Debug, Clone, Copy)]
pub struct TurnTimeouts {
    /// 提交输入直到拿到片段流
    pub request: Duration,
    /// 等待下一个片段
    pub stream: Duration,
}

impl From<&LlmTimeoutsSection> for TurnTimeouts {
    fn from(section: &LlmTimeoutsSection) -> Self {
        Self {
            request: section.request_timeout(),
            stream: section.stream_timeout(),
        }
    }
}

impl Default for TurnTimeouts {
    fn default() -> Self {
        Self::from(&LlmTimeoutsSection::default())
    }
}

/// 栈上的一条片段流；trailing 为打开它的工具片段所带文本，流结束后追加
struct Frame {
    stream: FragmentStream,
    trailing: Option<String>,
}

/// 一个进行中的回合
pub struct Turn {
    slot: ConversationSlot,
    log: SharedMessageLog,
    executor: ToolExecutor,
    timeouts: TurnTimeouts,
    cancel: CancellationToken,
    phase: TurnPhase,
    handle: Option<TurnHandle>,
    frames: Vec<Frame>,
    input: Option<TurnInput>,
    input_trailing: Option<String>,
    awaiting: Vec<ToolInvocationRequest>,
    outbox: VecDeque<MessageUpdate>,
    round_trips: usize,
}

impl Turn {
    /// `prompt` 为已拼好上下文的用户提交文本；槽位中须已有会话
    pub fn new(
        slot: ConversationSlot,
        prompt: String,
        log: SharedMessageLog,
        executor: ToolExecutor,
        timeouts: TurnTimeouts,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            slot,
            log,
            executor,
            timeouts,
            cancel,
            phase: TurnPhase::Opening,
            handle: None,
            frames: Vec::new(),
            input: Some(TurnInput::User(prompt)),
            input_trailing: None,
            awaiting: Vec::new(),
            outbox: VecDeque::new(),
            round_trips: 0,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// 已完成的远端往返次数（含首次提交）
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    /// 推进状态机直到产生下一条更新；回合结束后返回 None
    pub async fn next_update(&mut self) -> Option<MessageUpdate> {
        loop {
            if let Some(update) = self.outbox.pop_front() {
                return Some(update);
            }
            match self.phase {
                TurnPhase::Finalized | TurnPhase::Failed => return None,
                TurnPhase::Opening => self.open().await,
                TurnPhase::Streaming => self.pull().await,
                TurnPhase::AwaitingToolResults => self.run_tools().await,
            }
        }
    }

    async fn open(&mut self) {
        let Some(input) = self.input.take() else {
            self.fail(EngineError::Transport("nothing to submit".to_string()));
            return;
        };
        let trailing = self.input_trailing.take();
        let Some(conversation) = self.slot.as_mut() else {
            self.fail(EngineError::Unavailable("no conversation".to_string()));
            return;
        };

        let request_timeout = self.timeouts.request;
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            r = timeout(request_timeout, conversation.send_stream(input)) => Some(r),
        };
        self.round_trips += 1;

        match opened {
            None => self.abandon(),
            Some(Err(_)) => self.fail(EngineError::Timeout(format!(
                "no response within {:?}",
                request_timeout
            ))),
            Some(Ok(Err(e))) => self.fail(e.into()),
            Some(Ok(Ok(stream))) => {
                debug!(round_trips = self.round_trips, "stream opened");
                self.frames.push(Frame { stream, trailing });
                self.phase = TurnPhase::Streaming;
                if self.handle.is_none() {
                    let (handle, message) = self.log.begin_assistant_turn();
                    self.handle = Some(handle);
                    self.outbox.push_back(MessageUpdate::new(message));
                }
            }
        }
    }

    async fn pull(&mut self) {
        let stream_timeout = self.timeouts.stream;
        let Some(frame) = self.frames.last_mut() else {
            self.finish();
            return;
        };
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            r = timeout(stream_timeout, frame.stream.next()) => Some(r),
        };

        match next {
            None => self.abandon(),
            Some(Err(_)) => self.fail(EngineError::Timeout(format!(
                "no fragment within {:?}",
                stream_timeout
            ))),
            Some(Ok(Some(Err(e)))) => self.fail(e.into()),
            Some(Ok(Some(Ok(fragment)))) => {
                if fragment.has_tool_requests() {
                    debug!(count = fragment.tool_requests.len(), "tool requests received");
                    self.awaiting = fragment.tool_requests;
                    self.input_trailing = fragment.text.filter(|t| !t.is_empty());
                    self.phase = TurnPhase::AwaitingToolResults;
                } else if let Some(text) = fragment.text {
                    self.append(&text);
                }
            }
            Some(Ok(None)) => {
                if let Some(text) = self.frames.pop().and_then(|f| f.trailing) {
                    self.append(&text);
                }
                if self.frames.is_empty() {
                    self.finish();
                }
            }
        }
    }

    async fn run_tools(&mut self) {
        let requests = std::mem::take(&mut self.awaiting);
        let results = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            r = self.executor.execute_batch(&requests) => Some(r),
        };
        match results {
            None => self.abandon(),
            Some(results) => {
                self.input = Some(TurnInput::ToolResults(results));
                self.phase = TurnPhase::Opening;
            }
        }
    }

    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(handle) = self.handle.as_ref() {
            if let Some(message) = self.log.append_delta(handle, text) {
                self.outbox.push_back(MessageUpdate::new(message));
            }
        }
    }

    fn close_entry(&mut self) -> Option<MessageUpdate> {
        self.frames.clear();
        self.handle
            .take()
            .and_then(|handle| self.log.finalize(handle))
            .map(MessageUpdate::new)
    }

    fn finish(&mut self) {
        self.phase = TurnPhase::Finalized;
        if let Some(update) = self.close_entry() {
            info!(round_trips = self.round_trips, "turn finalized");
            self.outbox.push_back(update);
        }
    }

    /// 传输错误或超时：保留已有文本，再追加一条错误消息
    fn fail(&mut self, err: EngineError) {
        warn!(error = %err, round_trips = self.round_trips, "turn failed");
        self.phase = TurnPhase::Failed;
        if let Some(update) = self.close_entry() {
            self.outbox.push_back(update);
        }
        let message = self
            .log
            .append_assistant(format!("{} {}", ERROR_PREFIX, err));
        self.outbox.push_back(MessageUpdate::new(message));
    }

    /// 调用方取消：静默收尾，不再产生更新
    fn abandon(&mut self) {
        info!(round_trips = self.round_trips, "turn abandoned");
        self.phase = TurnPhase::Finalized;
        self.close_entry();
        self.outbox.clear();
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("turn dropped mid-stream");
            self.log.finalize(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{word_fragments, ChatBackend, Fragment, LlmError, ScriptedBackend};
    use crate::memory::{MessageLog, Role};
    use crate::store::InMemoryStore;
    use crate::tools::ToolRegistry;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn turn_for(backend: &ScriptedBackend, log: &SharedMessageLog) -> Turn {
        let conversation = backend.start_conversation().await.unwrap();
        let slot = Arc::new(Mutex::new(Some(conversation))).lock_owned().await;
        let store = Arc::new(InMemoryStore::with_sample_data(
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
        ));
        let executor = ToolExecutor::new(ToolRegistry::new(store), 5);
        let timeouts = TurnTimeouts {
            request: Duration::from_secs(1),
            stream: Duration::from_millis(200),
        };
        Turn::new(
            slot,
            "hello".to_string(),
            log.clone(),
            executor,
            timeouts,
            CancellationToken::new(),
        )
    }

    async fn drain(turn: &mut Turn) -> Vec<MessageUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = turn.next_update().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn test_plain_stream_concatenates() {
        let backend = ScriptedBackend::new();
        backend.push_round(word_fragments("Your day looks light."));
        let log = SharedMessageLog::new(MessageLog::new());
        let mut turn = turn_for(&backend, &log).await;

        let updates = drain(&mut turn).await;
        let last = &updates.last().unwrap().message;
        assert_eq!(last.text, "Your day looks light.");
        assert!(!last.streaming);
        assert_eq!(turn.phase(), TurnPhase::Finalized);
        assert_eq!(turn.round_trips(), 1);
        // 初始空消息 + 4 个词 + 收尾
        assert_eq!(updates.len(), 6);
        assert!(updates[0].message.text.is_empty());
    }

    #[tokio::test]
    async fn test_tool_text_is_narrated_after_follow_up() {
        let backend = ScriptedBackend::new();
        let request = crate::llm::ToolInvocationRequest::new(
            "c1",
            "updateTaskStatus",
            json!({"taskId": "t1", "status": "completed"}),
        );
        backend
            .push_round(vec![
                Ok(Fragment::text("On it. ")),
                Ok(Fragment::tools(vec![request]).with_text("(checked)")),
            ])
            .push_round(word_fragments("Marked t1 done. "));
        let log = SharedMessageLog::new(MessageLog::new());
        let mut turn = turn_for(&backend, &log).await;

        drain(&mut turn).await;
        let messages = log.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "On it. Marked t1 done. (checked)");
        assert_eq!(turn.round_trips(), 2);

        let inputs = backend.inputs();
        match &inputs[1] {
            TurnInput::ToolResults(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].id, "c1");
                assert!(!results[0].is_error());
            }
            other => panic!("unexpected input: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_text() {
        let backend = ScriptedBackend::new();
        backend.push_round(vec![
            Ok(Fragment::text("Sure, I'll")),
            Err(LlmError::Stream("connection reset".to_string())),
        ]);
        let log = SharedMessageLog::new(MessageLog::new());
        let mut turn = turn_for(&backend, &log).await;

        drain(&mut turn).await;
        assert_eq!(turn.phase(), TurnPhase::Failed);
        let messages = log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "Sure, I'll");
        assert!(!messages[0].streaming);
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages[1].text.starts_with(ERROR_PREFIX));
        assert!(messages[1].text.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let backend = ScriptedBackend::new();
        backend.push_stalled_round(vec![Ok(Fragment::text("Thinking"))]);
        let log = SharedMessageLog::new(MessageLog::new());
        let mut turn = turn_for(&backend, &log).await;

        drain(&mut turn).await;
        let messages = log.snapshot();
        assert_eq!(messages[0].text, "Thinking");
        assert!(messages[1].text.contains("Timed out"));
        assert_eq!(messages.iter().filter(|m| m.streaming).count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_finalizes_silently() {
        let backend = ScriptedBackend::new();
        backend.push_stalled_round(vec![Ok(Fragment::text("Partial"))]);
        let log = SharedMessageLog::new(MessageLog::new());
        let mut turn = turn_for(&backend, &log).await;
        let cancel = turn.cancel.clone();

        turn.next_update().await.unwrap();
        turn.next_update().await.unwrap();
        cancel.cancel();
        assert!(turn.next_update().await.is_none());

        let messages = log.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Partial");
        assert!(!messages[0].streaming);
    }

    #[tokio::test]
    async fn test_drop_mid_stream_closes_entry() {
        let backend = ScriptedBackend::new();
        backend.push_stalled_round(vec![Ok(Fragment::text("Half"))]);
        let log = SharedMessageLog::new(MessageLog::new());
        let mut turn = turn_for(&backend, &log).await;
        turn.next_update().await.unwrap();
        drop(turn);

        let messages = log.snapshot();
        assert_eq!(messages.iter().filter(|m| m.streaming).count(), 0);
    }
}
