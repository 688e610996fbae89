//! OpenAI 兼容 API 后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。会话记录保存在句柄内，
//! 每次 send_stream 把记录 + 新消息整体提交，以流式方式读取增量；工具调用的分块参数在本地拼装，
//! 整条流结束后作为一个工具片段下发。
//!
//! 带 tool_calls 的助手消息只有在对应的工具结果也齐全时才进入已提交记录；
//! 工具阶段失败或被放弃的往返，在下一条用户消息到来时以错误结果补齐后提交。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCallChunk,
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{stream, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::config::LlmSection;
use crate::llm::{
    system_instruction, ChatBackend, Conversation, Fragment, FragmentStream, LlmError,
    ToolInvocationRequest, ToolPayload, TurnInput,
};
use crate::tools::tool_declarations;

/// 放弃的工具调用补齐时使用的错误文本
const ABANDONED_TOOL_ERROR: &str = "turn abandoned";

/// 默认读取的 API Key 环境变量
pub const OPENAI_KEY_VARS: &[&str] = &["OPENAI_API_KEY"];

/// OpenAI 兼容后端：持有 LLM 配置；凭据在每次建立会话时解析，便于运行中补配 Key
pub struct OpenAiBackend {
    settings: LlmSection,
    key_vars: &'static [&'static str],
}

impl OpenAiBackend {
    pub fn new(settings: LlmSection) -> Self {
        Self {
            settings,
            key_vars: OPENAI_KEY_VARS,
        }
    }

    /// 指定优先查找的环境变量（DeepSeek 等兼容端点）
    pub fn with_key_vars(mut self, key_vars: &'static [&'static str]) -> Self {
        self.key_vars = key_vars;
        self
    }

    /// 配置中的 api_key 优先，其次依序查找环境变量；空字符串视为未配置
    fn resolve_api_key(&self) -> Option<String> {
        self.settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.key_vars
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|k| !k.trim().is_empty()))
            })
    }

    fn client(&self) -> Result<Client<OpenAIConfig>, LlmError> {
        let api_key = self.resolve_api_key().ok_or(LlmError::MissingCredentials)?;
        let config = match self.settings.base_url.as_deref() {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Ok(Client::with_config(config))
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn start_conversation(&self) -> Result<Box<dyn Conversation>, LlmError> {
        let client = self.client()?;
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_instruction(Utc::now()))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        tracing::info!(model = %self.settings.model, "OpenAI-compatible conversation started");
        Ok(Box::new(OpenAiConversation {
            client,
            settings: self.settings.clone(),
            tools: openai_tools()?,
            transcript: Arc::new(Mutex::new(Transcript::new(
                ChatCompletionRequestMessage::System(system),
            ))),
        }))
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let client = self.client()?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .messages(vec![ChatCompletionRequestMessage::User(user)])
            .temperature(self.settings.temperature)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

/// 把工具声明转成 OpenAI function tools
fn openai_tools() -> Result<Vec<ChatCompletionTools>, LlmError> {
    tool_declarations()
        .into_iter()
        .map(|decl| {
            let function = FunctionObjectArgs::default()
                .name(decl.name)
                .description(decl.description)
                .parameters(decl.parameters)
                .build()
                .map_err(|e| LlmError::Request(e.to_string()))?;
            Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
        })
        .collect()
}

/// 会话记录：committed 只含完整往返；open 是仍在等待工具结果的往返，
/// outstanding 是 open 中最后一条助手消息里尚无结果的调用 id
#[derive(Debug, Default)]
struct Transcript {
    committed: Vec<ChatCompletionRequestMessage>,
    open: Vec<ChatCompletionRequestMessage>,
    outstanding: Vec<String>,
}

impl Transcript {
    fn new(system: ChatCompletionRequestMessage) -> Self {
        Self {
            committed: vec![system],
            ..Self::default()
        }
    }

    /// 本次请求要提交的完整消息序列；新用户消息到来时先收尾未完成的往返
    fn request_messages(
        &mut self,
        pending: &[ChatCompletionRequestMessage],
        user_turn: bool,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        if user_turn && !self.open.is_empty() {
            self.close_abandoned()?;
        }
        let mut all = self.committed.clone();
        all.extend(self.open.iter().cloned());
        all.extend(pending.iter().cloned());
        Ok(all)
    }

    /// 每个缺少结果的调用补一条错误 tool 消息，然后整体提交
    fn close_abandoned(&mut self) -> Result<(), LlmError> {
        let missing = std::mem::take(&mut self.outstanding);
        tracing::warn!(calls = missing.len(), "Closing abandoned tool round");
        let content = serde_json::to_string(&ToolPayload::Error(ABANDONED_TOOL_ERROR.to_string()))
            .map_err(|e| LlmError::Request(e.to_string()))?;
        for id in missing {
            self.open.push(tool_message(content.clone(), id)?);
        }
        self.committed.append(&mut self.open);
        Ok(())
    }

    /// 一轮流正常读完：本轮消息与回复并入 open；没有工具调用时整个往返提交
    fn complete_round(
        &mut self,
        pending: Vec<ChatCompletionRequestMessage>,
        reply: ChatCompletionRequestMessage,
        requests: &[ToolInvocationRequest],
    ) {
        self.open.extend(pending);
        self.open.push(reply);
        self.outstanding = requests.iter().map(|r| r.id.clone()).collect();
        if self.outstanding.is_empty() {
            self.committed.append(&mut self.open);
        }
    }
}

/// OpenAI 兼容会话句柄：记录与后台读流任务共享，读流任务在流读完时写回本轮往返
pub struct OpenAiConversation {
    client: Client<OpenAIConfig>,
    settings: LlmSection,
    tools: Vec<ChatCompletionTools>,
    transcript: Arc<Mutex<Transcript>>,
}

#[async_trait]
impl Conversation for OpenAiConversation {
    async fn send_stream(&mut self, input: TurnInput) -> Result<FragmentStream, LlmError> {
        let user_turn = matches!(input, TurnInput::User(_));
        let pending = to_request_messages(input)?;
        let messages = self
            .transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .request_messages(&pending, user_turn)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .messages(messages)
            .tools(self.tools.clone())
            .temperature(self.settings.temperature)
            .top_p(self.settings.top_p)
            .max_completion_tokens(self.settings.max_tokens)
            .stream(true)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let mut raw = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Result<Fragment, LlmError>>(32);
        let transcript = self.transcript.clone();
        tokio::spawn(async move {
            let mut text = String::new();
            let mut calls = ToolCallAssembly::default();
            while let Some(chunk) = raw.next().await {
                match chunk {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(delta) = choice.delta.content.filter(|t| !t.is_empty()) {
                                text.push_str(&delta);
                                // 接收端已丢弃：回合被放弃，本轮不写回
                                if tx.send(Ok(Fragment::text(delta))).await.is_err() {
                                    return;
                                }
                            }
                            for chunk in choice.delta.tool_calls.unwrap_or_default() {
                                calls.push(chunk);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("OpenAI stream failed: {}", e);
                        let _ = tx.send(Err(LlmError::Stream(e.to_string()))).await;
                        return;
                    }
                }
            }
            if tx.is_closed() {
                return;
            }

            let requests = calls.finish();
            match assistant_message(&text, &requests) {
                Ok(reply) => {
                    // 先写回再下发工具请求：调用方提交工具结果时 open 里必须已有对应的 tool_calls
                    transcript
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .complete_round(pending, reply, &requests);
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            if !requests.is_empty() {
                let _ = tx.send(Ok(Fragment::tools(requests))).await;
            }
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

fn to_request_messages(input: TurnInput) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    match input {
        TurnInput::User(text) => {
            let user = ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()
                .map_err(|e| LlmError::Request(e.to_string()))?;
            Ok(vec![ChatCompletionRequestMessage::User(user)])
        }
        TurnInput::ToolResults(results) => results
            .into_iter()
            .map(|result| tool_message(result.payload_json(), result.id))
            .collect(),
    }
}

fn tool_message(content: String, call_id: String) -> Result<ChatCompletionRequestMessage, LlmError> {
    let tool = ChatCompletionRequestToolMessageArgs::default()
        .content(content)
        .tool_call_id(call_id)
        .build()
        .map_err(|e| LlmError::Request(e.to_string()))?;
    Ok(ChatCompletionRequestMessage::Tool(tool))
}

fn assistant_message(
    text: &str,
    requests: &[ToolInvocationRequest],
) -> Result<ChatCompletionRequestMessage, LlmError> {
    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
    if !text.is_empty() {
        args.content(text.to_string());
    }
    if !requests.is_empty() {
        let tool_calls: Vec<ChatCompletionMessageToolCalls> = requests
            .iter()
            .map(|r| {
                ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                    id: r.id.clone(),
                    function: FunctionCall {
                        name: r.name.clone(),
                        arguments: Value::Object(r.arguments.clone()).to_string(),
                    },
                })
            })
            .collect();
        args.tool_calls(tool_calls);
    }
    let message = args.build().map_err(|e| LlmError::Request(e.to_string()))?;
    Ok(ChatCompletionRequestMessage::Assistant(message))
}

/// 按 index 拼装分块到达的工具调用（id / name 首块给出，arguments 分多块追加）
#[derive(Debug, Default)]
struct ToolCallAssembly {
    calls: BTreeMap<u32, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembly {
    fn push(&mut self, chunk: ChatCompletionMessageToolCallChunk) {
        let entry = self.calls.entry(chunk.index).or_default();
        if let Some(id) = chunk.id {
            entry.id = id;
        }
        if let Some(function) = chunk.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(args) = function.arguments {
                entry.arguments.push_str(&args);
            }
        }
    }

    fn finish(self) -> Vec<ToolInvocationRequest> {
        self.calls
            .into_values()
            .map(|call| ToolInvocationRequest {
                arguments: parse_arguments(&call.name, &call.arguments),
                id: call.id,
                name: call.name,
            })
            .collect()
    }
}

/// 参数不是合法 JSON 对象时记 warn 并给空参数，由工具校验返回结构化错误
fn parse_arguments(name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::warn!(tool = %name, "Tool arguments are not a JSON object: {}", raw);
            Map::new()
        }
    }
}
