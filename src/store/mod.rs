//! 领域存储：任务 / 日程 / 项目的接口与实现
//!
//! 权威数据归外部存储所有，引擎只读取投影并通过补丁写入；同一份存储也被 CRUD 界面直接修改，
//! 因此引擎每次需要数据都重新拉取，不做缓存。

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpStore;
pub use memory::InMemoryStore;

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// 存储拒绝了写入（校验失败、重复 id 等）
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Jira,
    Slack,
    Email,
    Meeting,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub source: Source,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_minutes: u32,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<String>,
}

/// 任务的部分更新；None 字段不改
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(minutes) = self.estimated_minutes {
            task.estimated_minutes = minutes;
        }
        if let Some(due) = self.due_date {
            task.due_date = Some(due);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Meeting,
    Focus,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(rename = "start_time")]
    pub start: DateTime<Utc>,
    #[serde(rename = "end_time")]
    pub end: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
}

/// 日程的部分更新（改期只动时间窗）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventPatch {
    #[serde(rename = "start_time", skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(rename = "end_time", skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl EventPatch {
    pub fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn apply(&self, event: &mut CalendarEvent) {
        if let Some(start) = self.start {
            event.start = start;
        }
        if let Some(end) = self.end {
            event.end = end;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    OnTrack,
    AtRisk,
    Delayed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    /// 0-100
    pub progress: u8,
    pub next_milestone: String,
    pub milestone_date: String,
}

/// 领域存储接口：引擎只依赖这五个读写操作（外加简报用的项目列表）
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    async fn list_events(&self) -> Result<Vec<CalendarEvent>, StoreError>;

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError>;

    async fn create_task(&self, task: Task) -> Result<Task, StoreError>;

    async fn update_event(&self, id: &str, patch: EventPatch) -> Result<CalendarEvent, StoreError>;
}
