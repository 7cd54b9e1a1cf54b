//! Collaborator seams used by the timer engine.
//! Task and project persistence is asynchronous from the engine's point of view;
//! the SQLite `Database` implements both.

use crate::database::Database;
use crate::error::TimerError;
use crate::models::{Project, ProjectId, Task, TaskId, TaskStatus, TaskUpdate};

#[allow(async_fn_in_trait)]
pub trait TaskService {
    async fn get(&self, id: TaskId) -> Result<Task, TimerError>;

    /// Applies all fields of `update` in one write; either everything commits or nothing.
    async fn update(&self, id: TaskId, update: TaskUpdate) -> Result<Task, TimerError>;

    /// Tasks currently marked in-progress; used to reconcile them with the stored timer.
    async fn list_in_progress(&self) -> Result<Vec<Task>, TimerError>;
}

#[allow(async_fn_in_trait)]
pub trait ProjectService {
    async fn get_project(&self, id: ProjectId) -> Result<Project, TimerError>;

    /// The only entry point that mutates `total_actual_hours`.
    async fn log_time(&self, project_id: ProjectId, minutes: u32) -> Result<Project, TimerError>;
}

impl TaskService for Database {
    async fn get(&self, id: TaskId) -> Result<Task, TimerError> {
        self.get_task(id)?
            .ok_or_else(|| TimerError::NotFound(format!("Task with id {} not found", id)))
    }

    async fn update(&self, id: TaskId, update: TaskUpdate) -> Result<Task, TimerError> {
        self.update_task(id, &update)?
            .ok_or_else(|| TimerError::NotFound(format!("Task with id {} not found", id)))
    }

    async fn list_in_progress(&self) -> Result<Vec<Task>, TimerError> {
        Ok(self.list_tasks_with_status(TaskStatus::InProgress)?)
    }
}

impl ProjectService for Database {
    async fn get_project(&self, id: ProjectId) -> Result<Project, TimerError> {
        Database::get_project(self, id)?
            .ok_or_else(|| TimerError::NotFound(format!("Project with id {} not found", id)))
    }

    async fn log_time(&self, project_id: ProjectId, minutes: u32) -> Result<Project, TimerError> {
        self.log_time_to_project(project_id, minutes)?.ok_or_else(|| {
            TimerError::NotFound(format!("Project with id {} not found", project_id))
        })
    }
}
