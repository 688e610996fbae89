//! 内存存储：本地演示与测试用，带一份示例数据（任务 t1-t4、日程 e1-e3、项目 p1-p3）

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{
    CalendarEvent, DomainStore, EventKind, EventPatch, Priority, Project, ProjectStatus, Source,
    StoreError, Task, TaskPatch, TaskStatus,
};

#[derive(Debug, Default)]
struct StoreData {
    tasks: Vec<Task>,
    events: Vec<CalendarEvent>,
    projects: Vec<Project>,
}

/// 进程内存储；读写均经 RwLock，与 CRUD 界面共享时同样安全
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(tasks: Vec<Task>, events: Vec<CalendarEvent>, projects: Vec<Project>) -> Self {
        Self {
            data: RwLock::new(StoreData {
                tasks,
                events,
                projects,
            }),
        }
    }

    /// 以 `today` 为基准生成示例数据
    pub fn with_sample_data(today: NaiveDate) -> Self {
        Self::with_data(sample_tasks(today), sample_events(today), sample_projects())
    }

    /// 按 id 查任务（测试与 CLI 展示用）
    pub async fn task(&self, id: &str) -> Option<Task> {
        self.data.read().await.tasks.iter().find(|t| t.id == id).cloned()
    }

    pub async fn event(&self, id: &str) -> Option<CalendarEvent> {
        self.data.read().await.events.iter().find(|e| e.id == id).cloned()
    }
}

#[async_trait]
impl DomainStore for InMemoryStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.data.read().await.tasks.clone())
    }

    async fn list_events(&self) -> Result<Vec<CalendarEvent>, StoreError> {
        Ok(self.data.read().await.events.clone())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.data.read().await.projects.clone())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::Rejected("No fields to update".to_string()));
        }
        let mut data = self.data.write().await;
        let task = data
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "task",
                id: id.to_string(),
            })?;
        patch.apply(task);
        Ok(task.clone())
    }

    async fn create_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut data = self.data.write().await;
        if data.tasks.iter().any(|t| t.id == task.id) {
            return Err(StoreError::Rejected(format!("task {} already exists", task.id)));
        }
        // 新任务排在最前，与看板的展示顺序一致
        data.tasks.insert(0, task.clone());
        Ok(task)
    }

    async fn update_event(&self, id: &str, patch: EventPatch) -> Result<CalendarEvent, StoreError> {
        let mut data = self.data.write().await;
        let event = data
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "event",
                id: id.to_string(),
            })?;
        patch.apply(event);
        Ok(event.clone())
    }
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    day.and_hms_opt(hour, minute, 0)
        .unwrap_or_default()
        .and_utc()
}

fn sample_tasks(today: NaiveDate) -> Vec<Task> {
    vec![
        Task {
            id: "t1".into(),
            title: "Review Q2 Financial Forecast".into(),
            description: "Finance team needs approval on the revised budget before EOD.".into(),
            source: Source::Email,
            priority: Priority::Critical,
            due_date: Some(at(today, 17, 0)),
            estimated_minutes: 45,
            status: TaskStatus::Todo,
            project: Some("Corporate Strategy".into()),
            assignee: None,
            context_link: Some("mailto:cfo@company.com".into()),
            ai_analysis: Some("Urgent email subject; deadline is today.".into()),
        },
        Task {
            id: "t2".into(),
            title: "Fix API Rate Limiting Bug".into(),
            description: "Ticket PROJ-124: users report unexpected 429 errors.".into(),
            source: Source::Jira,
            priority: Priority::High,
            due_date: None,
            estimated_minutes: 120,
            status: TaskStatus::InProgress,
            project: Some("Platform Scale".into()),
            assignee: None,
            context_link: Some("jira.company.com/browse/PROJ-124".into()),
            ai_analysis: None,
        },
        Task {
            id: "t3".into(),
            title: "Prepare Slide Deck for All-Hands".into(),
            description: "Draft the product roadmap section.".into(),
            source: Source::Slack,
            priority: Priority::Medium,
            due_date: Some(at(today + Duration::days(2), 0, 0)),
            estimated_minutes: 60,
            status: TaskStatus::Todo,
            project: Some("Internal Comms".into()),
            assignee: None,
            context_link: None,
            ai_analysis: None,
        },
        Task {
            id: "t4".into(),
            title: "Approve Design Assets for Campaign".into(),
            description: "Review the Figma file for the new landing page.".into(),
            source: Source::Jira,
            priority: Priority::Low,
            due_date: None,
            estimated_minutes: 15,
            status: TaskStatus::Todo,
            project: Some("Marketing Launch".into()),
            assignee: None,
            context_link: None,
            ai_analysis: None,
        },
    ]
}

fn sample_events(today: NaiveDate) -> Vec<CalendarEvent> {
    vec![
        CalendarEvent {
            id: "e1".into(),
            title: "Daily Standup".into(),
            start: at(today, 9, 30),
            end: at(today, 10, 0),
            kind: EventKind::Meeting,
            attendees: vec!["team@company.com".into()],
        },
        CalendarEvent {
            id: "e2".into(),
            title: "Deep Work: API Architecture".into(),
            start: at(today, 10, 30),
            end: at(today, 12, 30),
            kind: EventKind::Focus,
            attendees: Vec::new(),
        },
        CalendarEvent {
            id: "e3".into(),
            title: "Vendor Sync".into(),
            start: at(today, 14, 0),
            end: at(today, 14, 30),
            kind: EventKind::Meeting,
            attendees: Vec::new(),
        },
    ]
}

fn sample_projects() -> Vec<Project> {
    vec![
        Project {
            id: "p1".into(),
            name: "Project Apollo".into(),
            status: ProjectStatus::OnTrack,
            progress: 75,
            next_milestone: "Beta Launch".into(),
            milestone_date: "2024-06-15".into(),
        },
        Project {
            id: "p2".into(),
            name: "Platform Migration".into(),
            status: ProjectStatus::AtRisk,
            progress: 40,
            next_milestone: "Database Switchover".into(),
            milestone_date: "2024-05-30".into(),
        },
        Project {
            id: "p3".into(),
            name: "Mobile App Refresh".into(),
            status: ProjectStatus::Delayed,
            progress: 20,
            next_milestone: "Design Approval".into(),
            milestone_date: "2024-05-10".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::with_sample_data(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
    }

    #[tokio::test]
    async fn test_sample_data() {
        let store = store();
        assert_eq!(store.list_tasks().await.unwrap().len(), 4);
        assert_eq!(store.list_events().await.unwrap().len(), 3);
        assert_eq!(store.list_projects().await.unwrap().len(), 3);
        assert_eq!(store.event("e1").await.unwrap().start.to_rfc3339(), "2026-03-02T09:30:00+00:00");
    }

    #[tokio::test]
    async fn test_update_task_status() {
        let store = store();
        let task = store
            .update_task("t1", TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(store.task("t1").await.unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn test_update_missing_task() {
        let err = store()
            .update_task("t99", TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                kind: "task",
                id: "t99".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_patch_rejected() {
        let err = store().update_task("t1", TaskPatch::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_create_task_prepends_and_rejects_duplicates() {
        let store = store();
        let mut task = store.task("t4").await.unwrap();
        task.id = "t5".into();
        store.create_task(task.clone()).await.unwrap();
        assert_eq!(store.list_tasks().await.unwrap()[0].id, "t5");
        assert!(matches!(
            store.create_task(task).await,
            Err(StoreError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_update_event_window() {
        let store = store();
        let start = at(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(), 11, 0);
        let end = start + Duration::minutes(30);
        let event = store
            .update_event("e3", EventPatch::window(start, end))
            .await
            .unwrap();
        assert_eq!(event.start, start);
        assert_eq!(event.end, end);
    }
}
