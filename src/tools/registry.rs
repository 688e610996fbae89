//! 工具注册表
//!
//! 把已校验的 ToolCall 分派到领域存储，返回给模型的结果文本；存储错误转为 EngineError::ToolExecution。

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use super::call::{NewTask, ToolCall};
use crate::core::EngineError;
use crate::store::{DomainStore, EventPatch, Source, Task, TaskPatch, TaskStatus};

/// 工具注册表：持有共享的领域存储，按 ToolCall 变体穷尽分派
#[derive(Clone)]
pub struct ToolRegistry {
    store: Arc<dyn DomainStore>,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn DomainStore>) -> Self {
        Self { store }
    }

    /// 执行一次工具调用，返回结果文本
    pub async fn dispatch(&self, call: ToolCall) -> Result<String, EngineError> {
        match call {
            ToolCall::UpdateTaskStatus { task_id, status } => {
                self.store
                    .update_task(&task_id, TaskPatch::status(status.task_status()))
                    .await?;
                Ok(format!("Task {} status updated to {}", task_id, status.as_str()))
            }
            ToolCall::CreateTask(new_task) => {
                let created = self.store.create_task(build_task(new_task)).await?;
                Ok(format!("Created task: {} (ID: {})", created.title, created.id))
            }
            ToolCall::RescheduleEvent(r) => {
                self.store
                    .update_event(&r.event_id, EventPatch::window(r.start, r.end))
                    .await?;
                Ok(format!(
                    "Event {} moved to {}",
                    r.event_id,
                    r.start.to_rfc3339_opts(SecondsFormat::Secs, true)
                ))
            }
        }
    }
}

fn build_task(new_task: NewTask) -> Task {
    Task {
        id: new_task_id(),
        title: new_task.title,
        description: new_task
            .description
            .unwrap_or_else(|| "Created via AI".to_string()),
        source: Source::Manual,
        priority: new_task.priority,
        due_date: Some(Utc::now()),
        estimated_minutes: new_task.estimated_minutes,
        status: TaskStatus::Todo,
        project: None,
        assignee: None,
        context_link: None,
        ai_analysis: None,
    }
}

/// 新任务 id：`t` + uuid 前 8 位十六进制
fn new_task_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("t{}", &simple[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Priority};
    use crate::tools::call::{RequestedStatus, Reschedule};
    use chrono::{NaiveDate, TimeZone};

    fn registry() -> (Arc<InMemoryStore>, ToolRegistry) {
        let today = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let store = Arc::new(InMemoryStore::with_sample_data(today));
        (store.clone(), ToolRegistry::new(store))
    }

    #[tokio::test]
    async fn test_update_status_is_idempotent() {
        let (store, registry) = registry();
        let call = ToolCall::UpdateTaskStatus {
            task_id: "t1".into(),
            status: RequestedStatus::Completed,
        };
        let first = registry.dispatch(call.clone()).await.unwrap();
        let second = registry.dispatch(call).await.unwrap();
        assert_eq!(first, "Task t1 status updated to completed");
        assert_eq!(first, second);
        assert_eq!(store.task("t1").await.unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn test_update_missing_task_is_tool_error() {
        let (_store, registry) = registry();
        let err = registry
            .dispatch(ToolCall::UpdateTaskStatus {
                task_id: "t404".into(),
                status: RequestedStatus::Todo,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::ToolExecution("task t404 not found".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_task_reports_id() {
        let (store, registry) = registry();
        let text = registry
            .dispatch(ToolCall::CreateTask(NewTask {
                title: "Renew contract".into(),
                description: None,
                priority: Priority::High,
                estimated_minutes: 30,
            }))
            .await
            .unwrap();
        let id = text
            .rsplit("(ID: ")
            .next()
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap()
            .to_string();
        assert!(text.starts_with("Created task: Renew contract"));
        assert!(id.starts_with('t'));
        let task = store.task(&id).await.unwrap();
        assert_eq!(task.description, "Created via AI");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_reschedule_event() {
        let (store, registry) = registry();
        let start = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap();
        let text = registry
            .dispatch(ToolCall::RescheduleEvent(Reschedule {
                event_id: "e1".into(),
                start,
                end,
            }))
            .await
            .unwrap();
        assert_eq!(text, "Event e1 moved to 2026-03-04T09:00:00Z");
        let event = store.event("e1").await.unwrap();
        assert_eq!(event.start, start);
        assert_eq!(event.end, end);
    }
}
