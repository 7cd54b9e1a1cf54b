use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TaskId = i64;
pub type ProjectId = i64;

/// Статус задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("Unknown task status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// Unknown values fall back to Medium, the default for new tasks.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "Low" => Priority::Low,
            "High" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub estimated_minutes: u32,
    pub actual_minutes: u32,
    pub project_id: Option<ProjectId>,
    /// Epoch ms, set while the task is being timed
    pub timer_started: Option<u64>,
    /// Epoch ms, set exactly once
    pub completed_at: Option<u64>,
    pub created_at: u64,
}

/// Input for a new task (the title/priority/estimate tuple produced upstream).
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub estimated_minutes: u32,
    pub project_id: Option<ProjectId>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, estimated_minutes: u32) -> Self {
        Self {
            title: title.into(),
            priority: Priority::Medium,
            estimated_minutes,
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Частичное обновление задачи
/// `timer_started: Some(None)` очищает поле, `None` — не трогает
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub actual_minutes: Option<u32>,
    pub timer_started: Option<Option<u64>>,
    pub completed_at: Option<u64>,
}

impl TaskUpdate {
    pub fn apply(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(minutes) = self.actual_minutes {
            task.actual_minutes = minutes;
        }
        if let Some(timer_started) = self.timer_started {
            task.timer_started = timer_started;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = Some(completed_at);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub total_estimated_hours: f64,
    pub total_actual_hours: f64,
    pub created_at: u64,
}

/// Активная сессия таймера — единственный экземпляр на всю систему
/// Хранится в engine (кеш) и в app_meta (долговременная копия)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub task_id: TaskId,
    /// Epoch ms
    pub start_time: u64,
}

impl TimerSession {
    /// Elapsed whole seconds at `now_ms`. A start time in the future counts as zero.
    pub fn elapsed_seconds(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_time) / 1000
    }
}

pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        assert_eq!("in-progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_session_layout_is_camel_case() {
        let session = TimerSession {
            task_id: 7,
            start_time: 1_700_000_000_000,
        };
        let json = serde_json::to_value(session).unwrap();
        assert_eq!(json["taskId"], 7);
        assert_eq!(json["startTime"], 1_700_000_000_000u64);
    }

    #[test]
    fn test_session_elapsed_clamps_future_start() {
        let session = TimerSession {
            task_id: 1,
            start_time: 10_000,
        };
        assert_eq!(session.elapsed_seconds(100_999), 90);
        assert_eq!(session.elapsed_seconds(5_000), 0);
    }

    #[test]
    fn test_task_update_clears_timer() {
        let mut task = Task {
            id: 1,
            title: "Write report".to_string(),
            priority: Priority::High,
            status: TaskStatus::InProgress,
            estimated_minutes: 60,
            actual_minutes: 5,
            project_id: None,
            timer_started: Some(123),
            completed_at: None,
            created_at: 0,
        };
        let update = TaskUpdate {
            status: Some(TaskStatus::Pending),
            actual_minutes: Some(7),
            timer_started: Some(None),
            ..Default::default()
        };
        update.apply(&mut task);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.actual_minutes, 7);
        assert_eq!(task.timer_started, None);
        assert_eq!(task.estimated_minutes, 60);
    }
}
