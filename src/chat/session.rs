//! 会话管理器：持有会话句柄与消息日志，是对话引擎唯一的变更入口
//!
//! 会话句柄惰性创建，失败不缓存，下次 send 重新尝试（凭据可能在之后才配置）。
//! 每次 send 先排队获取句柄的 owned guard，回合期间一直持有，因此并发的 send 依次执行、不会交错。

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::Local;
use futures_util::stream;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{info, warn};

use super::briefing::morning_briefing;
use super::context::build_context;
use super::coordinator::{ConversationSlot, Turn, TurnTimeouts};
use super::events::{MessageUpdate, MessageUpdates};
use crate::config::AppConfig;
use crate::core::{EngineError, SessionSupervisor};
use crate::llm::{create_backend_from_config, ChatBackend, Conversation};
use crate::memory::{Message, MessageLog, SharedMessageLog};
use crate::store::{DomainStore, HttpStore, InMemoryStore};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 无法建立会话时追加的固定提示
pub const UNAVAILABLE_MESSAGE: &str =
    "AI capabilities are currently unavailable. Please check your API Key configuration.";

/// 会话管理器；Clone 后共享同一会话、日志与存储
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<RwLock<Arc<dyn ChatBackend>>>,
    store: Arc<dyn DomainStore>,
    executor: ToolExecutor,
    conversation: Arc<Mutex<Option<Box<dyn Conversation>>>>,
    log: SharedMessageLog,
    supervisor: Arc<SessionSupervisor>,
    timeouts: TurnTimeouts,
    max_context_entries: usize,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn DomainStore>,
        config: &AppConfig,
    ) -> Self {
        let executor = ToolExecutor::new(
            ToolRegistry::new(Arc::clone(&store)),
            config.tools.tool_timeout_secs,
        )
        .with_default_estimated_minutes(config.tools.default_estimated_minutes);

        let mut log = MessageLog::new();
        if !config.app.welcome_message.is_empty() {
            log.append_assistant(config.app.welcome_message.clone());
        }

        Self {
            backend: Arc::new(RwLock::new(backend)),
            store,
            executor,
            conversation: Arc::new(Mutex::new(None)),
            log: SharedMessageLog::new(log),
            supervisor: Arc::new(SessionSupervisor::new()),
            timeouts: TurnTimeouts::from(&config.llm.timeouts),
            max_context_entries: config.app.max_context_entries,
        }
    }

    /// 按配置选择后端与存储（设置 store.api_url 时走 REST，否则用内置示例数据）
    pub fn from_config(config: &AppConfig) -> Self {
        let backend = create_backend_from_config(config);
        let store: Arc<dyn DomainStore> = match config.store.api_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                info!("Using REST store at {}", url);
                Arc::new(HttpStore::new(url))
            }
            _ => {
                info!("Using in-memory store with sample data");
                Arc::new(InMemoryStore::with_sample_data(Local::now().date_naive()))
            }
        };
        Self::new(backend, store, config)
    }

    /// 确认会话句柄可用，必要时创建；失败返回 Unavailable
    pub async fn ensure_session(&self) -> Result<(), EngineError> {
        let slot = Arc::clone(&self.conversation).lock_owned().await;
        self.establish(slot).await.map(|_| ())
    }

    /// 发送一条用户消息，返回本次交互的消息更新流（惰性，被轮询时才排队执行）
    ///
    /// 流中依次是用户消息、助手消息的每次增长，最后是收尾或错误消息；从不返回错误。
    pub fn send(&self, user_text: impl Into<String>) -> MessageUpdates {
        let start = SendState::Start {
            session: self.clone(),
            text: user_text.into(),
        };
        Box::pin(stream::unfold(start, |state| async move {
            match state {
                SendState::Start { session, text } => session.start_turn(text).await,
                SendState::Running(mut turn) => turn
                    .next_update()
                    .await
                    .map(|update| (update, SendState::Running(turn))),
                SendState::Draining(mut queue) => queue
                    .pop_front()
                    .map(|update| (update, SendState::Draining(queue))),
            }
        }))
    }

    async fn start_turn(self, text: String) -> Option<(MessageUpdate, SendState)> {
        let slot = Arc::clone(&self.conversation).lock_owned().await;
        let user = MessageUpdate::new(self.log.append_user(text.clone()));

        match self.establish(slot).await {
            Ok(slot) => {
                let prompt = self.snapshot_context(&text).await;
                let turn = Turn::new(
                    slot,
                    prompt,
                    self.log.clone(),
                    self.executor.clone(),
                    self.timeouts,
                    self.supervisor.begin_turn(),
                );
                Some((user, SendState::Running(Box::new(turn))))
            }
            Err(err) => {
                warn!(error = %err, "assistant unavailable");
                let advisory = MessageUpdate::new(self.log.append_assistant(UNAVAILABLE_MESSAGE));
                Some((user, SendState::Draining(VecDeque::from([advisory]))))
            }
        }
    }

    async fn establish(&self, mut slot: ConversationSlot) -> Result<ConversationSlot, EngineError> {
        if slot.is_some() {
            return Ok(slot);
        }
        let backend = self.backend();
        let created = timeout(self.timeouts.request, backend.start_conversation())
            .await
            .map_err(|_| EngineError::Unavailable("conversation setup timed out".to_string()))?
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        info!("Remote conversation established");
        *slot = Some(created);
        Ok(slot)
    }

    /// 每次发送都重新读取存储；读取失败时以空列表代替
    async fn snapshot_context(&self, user_text: &str) -> String {
        let (tasks, events) = tokio::join!(self.store.list_tasks(), self.store.list_events());
        let tasks = tasks.unwrap_or_else(|e| {
            warn!(error = %e, "context: failed to list tasks");
            Vec::new()
        });
        let events = events.unwrap_or_else(|e| {
            warn!(error = %e, "context: failed to list events");
            Vec::new()
        });
        build_context(&tasks, &events, user_text, self.max_context_entries)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.log.snapshot()
    }

    /// 订阅完整消息列表（渲染层用）
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.log.subscribe()
    }

    /// 放弃进行中的回合；不影响之后的 send
    pub fn cancel(&self) {
        self.supervisor.cancel();
    }

    /// 放弃进行中的回合并丢弃会话句柄，下一次 send 会开启新的远端会话；消息日志保留
    pub async fn reset(&self) {
        self.supervisor.cancel();
        let mut slot = self.conversation.lock().await;
        *slot = None;
        info!("Conversation reset");
    }

    /// 换用新的后端（配置重载后）；进行中的回合被放弃，会话句柄丢弃，下一次 send 用新后端建立会话
    pub async fn replace_backend(&self, backend: Arc<dyn ChatBackend>) {
        self.supervisor.cancel();
        let mut slot = self.conversation.lock().await;
        *self.backend.write().unwrap_or_else(|e| e.into_inner()) = backend;
        *slot = None;
        info!("Chat backend replaced");
    }

    fn backend(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.backend.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub async fn morning_briefing(&self) -> String {
        let backend = self.backend();
        morning_briefing(
            backend.as_ref(),
            self.store.as_ref(),
            Local::now().date_naive(),
        )
        .await
    }

    pub fn store(&self) -> Arc<dyn DomainStore> {
        Arc::clone(&self.store)
    }
}

enum SendState {
    Start { session: SessionManager, text: String },
    Running(Box<Turn>),
    Draining(VecDeque<MessageUpdate>),
}
