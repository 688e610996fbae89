//! REST 存储：对接看板后端的 /api/tasks、/api/events、/api/projects
//!
//! 线上字段为 snake_case（due_date、start_time 等）；非 2xx 响应体形如 `{"error": "..."}`，
//! 404 映射为 NotFound，4xx 映射为 Rejected，其余为 Backend。

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CalendarEvent, DomainStore, EventPatch, Project, StoreError, Task, TaskPatch};

/// 默认后端地址
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        handle_response(response, "resource", path).await
    }
}

/// 统一处理响应：成功则反序列化，失败则读 `{"error"}` 并映射为 StoreError
async fn handle_response<T: DeserializeOwned>(
    response: Response,
    kind: &'static str,
    id: &str,
) -> Result<T, StoreError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()));
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| status.to_string());
    Err(status_error(status, kind, id, message))
}

fn status_error(status: StatusCode, kind: &'static str, id: &str, message: String) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    } else if status.is_client_error() {
        StoreError::Rejected(message)
    } else {
        StoreError::Backend(format!("{}: {}", status, message))
    }
}

#[async_trait]
impl DomainStore for HttpStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.get("/api/tasks").await
    }

    async fn list_events(&self) -> Result<Vec<CalendarEvent>, StoreError> {
        self.get("/api/events").await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.get("/api/projects").await
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        let response = self
            .client
            .patch(self.url(&format!("/api/tasks/{}", id)))
            .json(&patch)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        handle_response(response, "task", id).await
    }

    async fn create_task(&self, task: Task) -> Result<Task, StoreError> {
        let response = self
            .client
            .post(self.url("/api/tasks"))
            .json(&task)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        handle_response(response, "task", &task.id).await
    }

    async fn update_event(&self, id: &str, patch: EventPatch) -> Result<CalendarEvent, StoreError> {
        let response = self
            .client
            .patch(self.url(&format!("/api/events/{}", id)))
            .json(&patch)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        handle_response(response, "event", id).await
    }
}
