//! 上下文快照：每次发送前把当前任务与日程的投影拼到用户原话之前
//!
//! 任务状态用工具参数的词汇（todo / in-progress / completed），模型可以原样回填到 updateTaskStatus。

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::store::{CalendarEvent, Task};
use crate::tools::RequestedStatus;

#[derive(Serialize)]
struct TaskView<'a> {
    id: &'a str,
    title: &'a str,
    status: &'static str,
}

#[derive(Serialize)]
struct EventView<'a> {
    id: &'a str,
    title: &'a str,
    start: String,
}

/// 生成带上下文的提交文本；每个列表最多 `max_entries` 条，超出部分以计数注明
pub fn build_context(
    tasks: &[Task],
    events: &[CalendarEvent],
    user_text: &str,
    max_entries: usize,
) -> String {
    let task_views: Vec<TaskView<'_>> = tasks
        .iter()
        .take(max_entries)
        .map(|t| TaskView {
            id: &t.id,
            title: &t.title,
            status: RequestedStatus::from(t.status).as_str(),
        })
        .collect();
    let event_views: Vec<EventView<'_>> = events
        .iter()
        .take(max_entries)
        .map(|e| EventView {
            id: &e.id,
            title: &e.title,
            start: iso(e.start),
        })
        .collect();

    format!(
        "[System Context]:\nCurrent Tasks: {}{}\nCurrent Events: {}{}\n\nUser Request: {}",
        to_json(&task_views),
        overflow(tasks.len(), max_entries),
        to_json(&event_views),
        overflow(events.len(), max_entries),
        user_text
    )
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_json<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn overflow(total: usize, max_entries: usize) -> String {
    if total > max_entries {
        format!(" (+{} more not shown)", total - max_entries)
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DomainStore, InMemoryStore, TaskPatch, TaskStatus};
    use chrono::NaiveDate;

    async fn sample() -> (Vec<Task>, Vec<CalendarEvent>) {
        let store = InMemoryStore::with_sample_data(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        (store.list_tasks().await.unwrap(), store.list_events().await.unwrap())
    }

    #[tokio::test]
    async fn test_context_layout() {
        let (tasks, events) = sample().await;
        let text = build_context(&tasks, &events, "Mark t1 done", 50);
        assert!(text.starts_with("[System Context]:\nCurrent Tasks: [{\"id\":\"t1\""));
        assert!(text.contains("\"status\":\"todo\""));
        assert!(text.contains("\nCurrent Events: [{\"id\":\"e1\""));
        assert!(text.ends_with("\n\nUser Request: Mark t1 done"));
        assert!(!text.contains("more not shown"));
    }

    #[tokio::test]
    async fn test_status_uses_tool_vocabulary() {
        let store = InMemoryStore::with_sample_data(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        store
            .update_task("t1", TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap();
        store
            .update_task("t2", TaskPatch::status(TaskStatus::InProgress))
            .await
            .unwrap();
        let tasks = store.list_tasks().await.unwrap();
        let text = build_context(&tasks, &[], "What is left?", 50);
        assert!(text.contains("\"id\":\"t1\",\"title\":\"Review Q2 Financial Forecast\",\"status\":\"completed\""));
        assert!(text.contains("\"status\":\"in-progress\""));
        assert!(!text.contains("\"done\""));
        assert!(!text.contains("in_progress"));
    }

    #[tokio::test]
    async fn test_context_is_bounded() {
        let (tasks, events) = sample().await;
        let text = build_context(&tasks, &events, "hi", 1);
        assert!(text.contains(&format!("(+{} more not shown)", tasks.len() - 1)));
        assert!(!text.contains("\"id\":\"t2\""));
        assert!(!text.contains("\"id\":\"e2\""));
    }

    #[test]
    fn test_empty_lists() {
        let text = build_context(&[], &[], "hello", 50);
        assert_eq!(
            text,
            "[System Context]:\nCurrent Tasks: []\nCurrent Events: []\n\nUser Request: hello"
        );
    }
}
