//! Mock 后端（用于测试与无 API Key 的本地演示）
//!
//! - `MockBackend`：按规则识别「mark task t1 as done」「create a high priority task called X」，
//!   发出对应工具调用，收到工具结果后逐词流式复述结果。
//! - `ScriptedBackend`：按预先排好的轮次逐条回放片段，记录每次提交的输入，供精确的流程测试使用。

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use regex::Regex;
use serde_json::json;

use crate::llm::{
    ChatBackend, Conversation, Fragment, FragmentStream, LlmError, ToolInvocationRequest,
    ToolPayload, TurnInput,
};

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bmark\s+(?:task\s+)?(\S+)\s+as\s+(done|completed|complete|finished|in[ -]progress|todo|to do)\b",
    )
    .expect("valid status regex")
});

static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcreate\s+(?:a|an)?\s*(low|medium|high)\s+priority\s+task\s+(?:called|named|titled)\s+(.+)$")
        .expect("valid create regex")
});

/// 规则型 Mock 后端
#[derive(Debug, Default, Clone, Copy)]
pub struct MockBackend;

#[async_trait]
impl ChatBackend for MockBackend {
    async fn start_conversation(&self) -> Result<Box<dyn Conversation>, LlmError> {
        Ok(Box::new(MockConversation::default()))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok("Good morning. Your schedule is loaded; start with the highest priority task before your first meeting.".to_string())
    }
}

#[derive(Debug, Default)]
struct MockConversation {
    next_call: u64,
}

impl MockConversation {
    fn call_id(&mut self) -> String {
        self.next_call += 1;
        format!("mock_call_{}", self.next_call)
    }
}

#[async_trait]
impl Conversation for MockConversation {
    async fn send_stream(&mut self, input: TurnInput) -> Result<FragmentStream, LlmError> {
        let fragments = match input {
            TurnInput::User(text) => {
                let request = user_request(&text).to_string();
                match interpret(&request) {
                    Some((name, args)) => {
                        let id = self.call_id();
                        vec![Ok(Fragment::tools(vec![ToolInvocationRequest::new(id, name, args)]))]
                    }
                    None => word_fragments(&format!(
                        "I can update task status or create tasks. You asked: {}",
                        request
                    )),
                }
            }
            TurnInput::ToolResults(results) => {
                let narration = results
                    .iter()
                    .map(|r| match &r.payload {
                        ToolPayload::Result(text) => format!("Done. {}.", text),
                        ToolPayload::Error(err) => format!("Sorry, I couldn't do that: {}.", err),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                word_fragments(&narration)
            }
        };
        Ok(Box::pin(stream::iter(fragments)))
    }
}

/// 取上下文块之后的用户原话
fn user_request(text: &str) -> &str {
    text.rsplit_once("User Request:")
        .map(|(_, request)| request.trim())
        .unwrap_or_else(|| text.trim())
}

fn interpret(request: &str) -> Option<(&'static str, serde_json::Value)> {
    if let Some(caps) = STATUS_RE.captures(request) {
        let task_id = caps[1].trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
        let status = match caps[2].to_lowercase().as_str() {
            "todo" | "to do" => "todo",
            s if s.starts_with("in") => "in-progress",
            _ => "completed",
        };
        return Some(("updateTaskStatus", json!({ "taskId": task_id, "status": status })));
    }
    if let Some(caps) = CREATE_RE.captures(request) {
        let title = caps[2].trim().trim_end_matches('.').trim_matches(|c: char| c == '"' || c == '\'');
        return Some((
            "createTask",
            json!({ "title": title, "priority": caps[1].to_lowercase() }),
        ));
    }
    None
}

/// 把一段文本按词切成文本片段，模拟逐 token 到达
pub fn word_fragments(text: &str) -> Vec<Result<Fragment, LlmError>> {
    text.split_inclusive(' ')
        .map(|word| Ok(Fragment::text(word)))
        .collect()
}

/// 一轮脚本：提交一次消息时远端的表现
#[derive(Debug)]
enum Round {
    /// 依次产出片段；stall 为 true 时产出完毕后永不结束
    Stream {
        fragments: Vec<Result<Fragment, LlmError>>,
        stall: bool,
    },
    /// 提交即失败
    Reject(LlmError),
}

#[derive(Debug, Default)]
struct ScriptState {
    unavailable: bool,
    rounds: VecDeque<Round>,
    inputs: Vec<TurnInput>,
    conversations_started: usize,
    completion: Option<Result<String, LlmError>>,
}

/// 脚本化后端：每次 send_stream 消费一轮脚本
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟缺少凭据：start_conversation 返回 MissingCredentials
    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.set_available(false);
        backend
    }

    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    pub fn push_round(&self, fragments: Vec<Result<Fragment, LlmError>>) -> &Self {
        self.lock().rounds.push_back(Round::Stream {
            fragments,
            stall: false,
        });
        self
    }

    /// 产出给定片段后挂起，用于超时与取消测试
    pub fn push_stalled_round(&self, fragments: Vec<Result<Fragment, LlmError>>) -> &Self {
        self.lock().rounds.push_back(Round::Stream {
            fragments,
            stall: true,
        });
        self
    }

    pub fn push_rejection(&self, err: LlmError) -> &Self {
        self.lock().rounds.push_back(Round::Reject(err));
        self
    }

    pub fn set_completion(&self, completion: Result<String, LlmError>) {
        self.lock().completion = Some(completion);
    }

    /// 按提交顺序记录的全部输入
    pub fn inputs(&self) -> Vec<TurnInput> {
        self.lock().inputs.clone()
    }

    pub fn conversations_started(&self) -> usize {
        self.lock().conversations_started
    }

    pub fn remaining_rounds(&self) -> usize {
        self.lock().rounds.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn start_conversation(&self) -> Result<Box<dyn Conversation>, LlmError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(LlmError::MissingCredentials);
        }
        state.conversations_started += 1;
        Ok(Box::new(ScriptedConversation {
            state: self.state.clone(),
        }))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        let state = self.lock();
        if state.unavailable {
            return Err(LlmError::MissingCredentials);
        }
        state
            .completion
            .clone()
            .unwrap_or_else(|| Err(LlmError::Request("no scripted completion".to_string())))
    }
}

struct ScriptedConversation {
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl Conversation for ScriptedConversation {
    async fn send_stream(&mut self, input: TurnInput) -> Result<FragmentStream, LlmError> {
        let round = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.inputs.push(input);
            state.rounds.pop_front()
        };
        match round {
            Some(Round::Stream { fragments, stall }) => {
                let replay = stream::iter(fragments);
                if stall {
                    Ok(Box::pin(replay.chain(stream::pending())))
                } else {
                    Ok(Box::pin(replay))
                }
            }
            Some(Round::Reject(err)) => Err(err),
            None => Err(LlmError::Request("no scripted round left".to_string())),
        }
    }
}
