//! 与远端对话服务交换的数据：片段、工具调用请求、工具结果、回合输入

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 远端在流中途发出的工具调用请求；只在产生它的回合内存活
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 工具结果负载：序列化为 `{"result": "..."}` 或 `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPayload {
    Result(String),
    Error(String),
}

/// 一次工具请求的结果；即使处理器失败也一定产生，远端需要每个请求都有对应结果才能继续
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// 与请求 id 一致
    pub id: String,
    pub name: String,
    pub payload: ToolPayload,
}

impl ToolResult {
    pub fn ok(request: &ToolInvocationRequest, text: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            payload: ToolPayload::Result(text.into()),
        }
    }

    pub fn error(request: &ToolInvocationRequest, message: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            payload: ToolPayload::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ToolPayload::Error(_))
    }

    /// 负载文本（不区分成功 / 失败）
    pub fn text(&self) -> &str {
        match &self.payload {
            ToolPayload::Result(t) | ToolPayload::Error(t) => t,
        }
    }

    /// 负载的 JSON 形式，作为 tool 消息内容回传给远端
    pub fn payload_json(&self) -> String {
        serde_json::to_string(&self.payload).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 流式响应中的一个增量单元：文本增量和 / 或工具调用请求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub text: Option<String>,
    pub tool_requests: Vec<ToolInvocationRequest>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_requests: Vec::new(),
        }
    }

    pub fn tools(requests: Vec<ToolInvocationRequest>) -> Self {
        Self {
            text: None,
            tool_requests: requests,
        }
    }

    /// 附带文本（工具片段的补充说明）
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}

/// 提交给会话句柄的一条消息：用户文本或一批工具结果
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    User(String),
    ToolResults(Vec<ToolResult>),
}
