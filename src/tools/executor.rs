//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute(request) 解析参数、在超时内分派，任何失败都转为
//! ToolResult 的 error 负载，从不返回 Err；每次调用输出一行结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::call::ToolCall;
use super::registry::ToolRegistry;
use crate::core::EngineError;
use crate::llm::{ToolInvocationRequest, ToolResult};

/// 工具执行器：解析、超时、审计
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    default_estimated_minutes: u32,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            default_estimated_minutes: 30,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_estimated_minutes(mut self, minutes: u32) -> Self {
        self.default_estimated_minutes = minutes;
        self
    }

    /// 执行一个工具请求；结果 id 与请求一致
    ///
    /// 分派在独立任务中运行：超时或调用方放弃等待时，已开始的存储写入仍会完成。
    pub async fn execute(&self, request: &ToolInvocationRequest) -> ToolResult {
        let start = Instant::now();
        let outcome = match ToolCall::parse(request, self.default_estimated_minutes) {
            Ok(call) => {
                let registry = self.registry.clone();
                let handle = tokio::spawn(async move { registry.dispatch(call).await });
                match timeout(self.timeout, handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(EngineError::ToolExecution(join_err.to_string())),
                    Err(_) => Err(EngineError::Timeout(format!(
                        "tool {} exceeded {}s",
                        request.name,
                        self.timeout.as_secs()
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        let label = match &outcome {
            Ok(_) => "ok",
            Err(EngineError::UnknownTool(_)) => "unknown_tool",
            Err(EngineError::InvalidArguments(_)) => "invalid_args",
            Err(EngineError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "call_id": request.id,
            "tool": request.name,
            "ok": outcome.is_ok(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(request),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match outcome {
            Ok(text) => ToolResult::ok(request, text),
            Err(e) => ToolResult::error(request, e.to_string()),
        }
    }

    /// 按给定顺序逐个执行，返回与请求一一对应的结果
    pub async fn execute_batch(&self, requests: &[ToolInvocationRequest]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.execute(request).await);
        }
        results
    }
}

fn args_preview(request: &ToolInvocationRequest) -> String {
    let s = serde_json::Value::Object(request.arguments.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
