//! 工具调用：名称到封闭枚举的解析与参数校验
//!
//! 每个受支持的工具对应 ToolCall 的一个变体，携带已校验的参数；未知工具与畸形参数在这里一次性拒绝，
//! 之后的分派对变体做穷尽匹配。

use chrono::{DateTime, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::EngineError;
use crate::llm::ToolInvocationRequest;
use crate::store::{Priority, TaskStatus};

/// 受支持的工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    UpdateTaskStatus,
    CreateTask,
    RescheduleEvent,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::UpdateTaskStatus,
        ToolKind::CreateTask,
        ToolKind::RescheduleEvent,
    ];

    /// 远端看到的工具名
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::UpdateTaskStatus => "updateTaskStatus",
            ToolKind::CreateTask => "createTask",
            ToolKind::RescheduleEvent => "rescheduleEvent",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::UpdateTaskStatus => "Update the status of a task",
            ToolKind::CreateTask => "Create a new task",
            ToolKind::RescheduleEvent => "Reschedule a calendar event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// 工具参数里可请求的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestedStatus {
    Todo,
    InProgress,
    Completed,
}

impl RequestedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestedStatus::Todo => "todo",
            RequestedStatus::InProgress => "in-progress",
            RequestedStatus::Completed => "completed",
        }
    }

    /// 映射到存储侧的状态值
    pub fn task_status(self) -> TaskStatus {
        match self {
            RequestedStatus::Todo => TaskStatus::Todo,
            RequestedStatus::InProgress => TaskStatus::InProgress,
            RequestedStatus::Completed => TaskStatus::Done,
        }
    }
}

impl From<TaskStatus> for RequestedStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Todo => RequestedStatus::Todo,
            TaskStatus::InProgress => RequestedStatus::InProgress,
            TaskStatus::Done => RequestedStatus::Completed,
        }
    }
}

/// 工具参数里可请求的优先级（CRITICAL 只能由人工设置）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestedPriority {
    Low,
    Medium,
    High,
}

impl From<RequestedPriority> for Priority {
    fn from(p: RequestedPriority) -> Self {
        match p {
            RequestedPriority::Low => Priority::Low,
            RequestedPriority::Medium => Priority::Medium,
            RequestedPriority::High => Priority::High,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskStatusArgs {
    /// The ID of the task to update
    pub task_id: String,
    /// The new status for the task
    pub status: RequestedStatus,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskArgs {
    /// The title of the task
    pub title: String,
    /// Detailed description of the task
    #[serde(default)]
    pub description: Option<String>,
    /// Priority level of the task
    pub priority: RequestedPriority,
    /// Estimated time to complete in minutes
    #[serde(default)]
    pub estimated_minutes: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleEventArgs {
    /// The ID of the event to reschedule
    pub event_id: String,
    /// New start time in ISO format
    pub new_start_time: String,
    /// New end time in ISO format
    pub new_end_time: String,
}

/// 已校验的新任务
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub estimated_minutes: u32,
}

/// 已校验的改期窗口（end 晚于 start）
#[derive(Debug, Clone, PartialEq)]
pub struct Reschedule {
    pub event_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 一次工具调用：每个变体携带已校验参数
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    UpdateTaskStatus {
        task_id: String,
        status: RequestedStatus,
    },
    CreateTask(NewTask),
    RescheduleEvent(Reschedule),
}

impl ToolCall {
    /// 解析并校验请求；`default_minutes` 为 createTask 未给 estimatedMinutes 时的取值
    pub fn parse(request: &ToolInvocationRequest, default_minutes: u32) -> Result<Self, EngineError> {
        let kind = ToolKind::from_name(&request.name)
            .ok_or_else(|| EngineError::UnknownTool(request.name.clone()))?;

        match kind {
            ToolKind::UpdateTaskStatus => {
                let args: UpdateTaskStatusArgs = decode(request)?;
                Ok(ToolCall::UpdateTaskStatus {
                    task_id: non_empty("taskId", args.task_id)?,
                    status: args.status,
                })
            }
            ToolKind::CreateTask => {
                let args: CreateTaskArgs = decode(request)?;
                let estimated_minutes = match args.estimated_minutes {
                    None => default_minutes,
                    Some(m) if m.is_finite() && m > 0.0 => m.round() as u32,
                    Some(m) => {
                        return Err(EngineError::InvalidArguments(format!(
                            "estimatedMinutes must be a positive number, got {}",
                            m
                        )))
                    }
                };
                Ok(ToolCall::CreateTask(NewTask {
                    title: non_empty("title", args.title)?,
                    description: args.description.filter(|d| !d.trim().is_empty()),
                    priority: args.priority.into(),
                    estimated_minutes,
                }))
            }
            ToolKind::RescheduleEvent => {
                let args: RescheduleEventArgs = decode(request)?;
                let start = parse_instant("newStartTime", &args.new_start_time)?;
                let end = parse_instant("newEndTime", &args.new_end_time)?;
                if end <= start {
                    return Err(EngineError::InvalidArguments(
                        "newEndTime must be after newStartTime".to_string(),
                    ));
                }
                Ok(ToolCall::RescheduleEvent(Reschedule {
                    event_id: non_empty("eventId", args.event_id)?,
                    start,
                    end,
                }))
            }
        }
    }
}

fn decode<T: DeserializeOwned>(request: &ToolInvocationRequest) -> Result<T, EngineError> {
    serde_json::from_value(Value::Object(request.arguments.clone()))
        .map_err(|e| EngineError::InvalidArguments(e.to_string()))
}

fn non_empty(field: &str, value: String) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EngineError::InvalidArguments(format!("{} must not be empty", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

/// ISO-8601：带偏移按偏移换算，不带偏移按 UTC 解释
fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>, EngineError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            EngineError::InvalidArguments(format!("{} is not an ISO-8601 time: {}", field, value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str, args: Value) -> ToolInvocationRequest {
        ToolInvocationRequest::new("call_1", name, args)
    }

    #[test]
    fn test_parse_update_status() {
        let call = ToolCall::parse(
            &request("updateTaskStatus", json!({"taskId": "t1", "status": "completed"})),
            30,
        )
        .unwrap();
        assert_eq!(
            call,
            ToolCall::UpdateTaskStatus {
                task_id: "t1".into(),
                status: RequestedStatus::Completed
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_status() {
        let err = ToolCall::parse(
            &request("updateTaskStatus", json!({"taskId": "t1", "status": "finished"})),
            30,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArguments(_)));
    }

    #[test]
    fn test_parse_rejects_blank_id() {
        let err = ToolCall::parse(
            &request("updateTaskStatus", json!({"taskId": "  ", "status": "todo"})),
            30,
        )
        .unwrap_err();
        assert_eq!(err, EngineError::InvalidArguments("taskId must not be empty".into()));
    }

    #[test]
    fn test_parse_create_task_defaults() {
        let call = ToolCall::parse(
            &request("createTask", json!({"title": "Renew contract", "priority": "high"})),
            30,
        )
        .unwrap();
        match call {
            ToolCall::CreateTask(task) => {
                assert_eq!(task.title, "Renew contract");
                assert_eq!(task.priority, Priority::High);
                assert_eq!(task.estimated_minutes, 30);
                assert!(task.description.is_none());
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_task_minutes() {
        let call = ToolCall::parse(
            &request(
                "createTask",
                json!({"title": "Write memo", "priority": "low", "estimatedMinutes": 44.6}),
            ),
            30,
        )
        .unwrap();
        assert!(matches!(call, ToolCall::CreateTask(NewTask { estimated_minutes: 45, .. })));

        let err = ToolCall::parse(
            &request(
                "createTask",
                json!({"title": "Write memo", "priority": "low", "estimatedMinutes": -5}),
            ),
            30,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArguments(_)));
    }

    #[test]
    fn test_parse_create_task_rejects_critical() {
        let err = ToolCall::parse(
            &request("createTask", json!({"title": "X", "priority": "critical"})),
            30,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArguments(_)));
    }

    #[test]
    fn test_parse_reschedule() {
        let call = ToolCall::parse(
            &request(
                "rescheduleEvent",
                json!({
                    "eventId": "e3",
                    "newStartTime": "2026-03-03T15:00:00+01:00",
                    "newEndTime": "2026-03-03T14:30:00"
                }),
            ),
            30,
        )
        .unwrap();
        match call {
            ToolCall::RescheduleEvent(r) => {
                assert_eq!(r.event_id, "e3");
                assert_eq!(r.start.to_rfc3339(), "2026-03-03T14:00:00+00:00");
                assert_eq!(r.end.to_rfc3339(), "2026-03-03T14:30:00+00:00");
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_parse_reschedule_rejects_inverted_window() {
        let err = ToolCall::parse(
            &request(
                "rescheduleEvent",
                json!({
                    "eventId": "e3",
                    "newStartTime": "2026-03-03T15:00:00Z",
                    "newEndTime": "2026-03-03T14:00:00Z"
                }),
            ),
            30,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArguments(_)));

        let err = ToolCall::parse(
            &request(
                "rescheduleEvent",
                json!({"eventId": "e3", "newStartTime": "tomorrow", "newEndTime": "later"}),
            ),
            30,
        )
        .unwrap_err();
        assert!(err.to_string().contains("newStartTime"));
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolCall::parse(&request("deleteEverything", json!({})), 30).unwrap_err();
        assert_eq!(err, EngineError::UnknownTool("deleteEverything".into()));
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
    }
}
