//! 晨间简报：一次性（非流式）生成三句话的当日概览

use chrono::{NaiveDate, SecondsFormat};
use tracing::warn;

use crate::llm::{ChatBackend, LlmError};
use crate::store::{CalendarEvent, DomainStore, Project, Task};

pub const BRIEFING_UNAVAILABLE: &str = "AI briefing unavailable. Please configure your API key.";
pub const BRIEFING_FALLBACK: &str = "Good morning! Your tasks and schedule are ready for review.";

const MAX_TASKS: usize = 5;
const MAX_EVENTS: usize = 5;
const MAX_PROJECTS: usize = 3;

/// 生成简报；从不失败，缺凭据与其它错误各有固定文案
pub async fn morning_briefing(
    backend: &dyn ChatBackend,
    store: &dyn DomainStore,
    today: NaiveDate,
) -> String {
    let (tasks, events, projects) =
        tokio::join!(store.list_tasks(), store.list_events(), store.list_projects());
    let (tasks, events, projects) = match (tasks, events, projects) {
        (Ok(t), Ok(e), Ok(p)) => (t, e, p),
        (t, e, p) => {
            let err = [t.err(), e.err(), p.err()].into_iter().flatten().next();
            warn!(error = ?err, "briefing: store unavailable");
            return BRIEFING_FALLBACK.to_string();
        }
    };

    let prompt = briefing_prompt(&tasks, &events, &projects, today);
    match backend.complete(&prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => BRIEFING_FALLBACK.to_string(),
        Err(LlmError::MissingCredentials) => BRIEFING_UNAVAILABLE.to_string(),
        Err(e) => {
            warn!(error = %e, "briefing generation failed");
            BRIEFING_FALLBACK.to_string()
        }
    }
}

/// 简报提示词：前 5 个任务、前 5 个日程、前 3 个项目
pub fn briefing_prompt(
    tasks: &[Task],
    events: &[CalendarEvent],
    projects: &[Project],
    today: NaiveDate,
) -> String {
    let task_summary = bullet_list(tasks.iter().take(MAX_TASKS).map(|t| {
        format!(
            "- {} ({}, priority: {:?})",
            t.title,
            t.status.as_str(),
            t.priority
        )
    }));
    let event_summary = bullet_list(events.iter().take(MAX_EVENTS).map(|e| {
        format!(
            "- {} at {}",
            e.title,
            e.start.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }));
    let project_summary = bullet_list(
        projects
            .iter()
            .take(MAX_PROJECTS)
            .map(|p| format!("- {}: {}% complete, next milestone {}", p.name, p.progress, p.next_milestone)),
    );

    format!(
        "Generate a concise, professional morning briefing for {}.\n\n\
         Keep it under 3 sentences. Focus on:\n\
         1. What needs attention today\n\
         2. Key meetings or deadlines\n\
         3. Overall workload assessment\n\n\
         Current Tasks:\n{}\n\n\
         Today's Events:\n{}\n\n\
         Active Projects:\n{}\n\n\
         Write in a calm, executive assistant tone. Be specific but brief.",
        today.format("%A, %B %-d"),
        task_summary.unwrap_or_else(|| "No active tasks".to_string()),
        event_summary.unwrap_or_else(|| "No events scheduled".to_string()),
        project_summary.unwrap_or_else(|| "No active projects".to_string()),
    )
}

fn bullet_list(lines: impl Iterator<Item = String>) -> Option<String> {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
