//! Command messages accepted from the presentation layer and the events returned for them.
//! These are the only entry points the UI may use: start, stop, complete.

use crate::engine::{CompleteOutcome, StartOutcome, StopOutcome, TimerEngine};
use crate::error::TimerError;
use crate::models::TaskId;
use crate::services::{ProjectService, TaskService};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartTimer {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    StopTimer,
    Complete {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        #[serde(default)]
        minutes: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    TimerStarted(StartOutcome),
    TimerStopped(StopOutcome),
    TaskCompleted(CompleteOutcome),
    /// Nothing changed; `kind` is the error kind
    Rejected { kind: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Уведомление для пользователя (toast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl Event {
    pub fn rejected(e: &TimerError) -> Self {
        Event::Rejected {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }

    /// Primary notice first, then one warning per non-fatal problem.
    pub fn notices(&self) -> Vec<Notice> {
        match self {
            Event::TimerStarted(outcome) => {
                let mut notices = Vec::new();
                if let Some(stopped) = &outcome.stopped {
                    notices.push(Notice::new(
                        NoticeLevel::Info,
                        format!(
                            "Timer stopped for: {} ({}m logged)",
                            stopped.task.title, stopped.minutes_logged
                        ),
                    ));
                }
                notices.push(Notice::new(
                    NoticeLevel::Info,
                    format!("Timer started for: {}", outcome.task.title),
                ));
                notices.extend(warning_notices(&outcome.warnings));
                notices
            }
            Event::TimerStopped(outcome) => vec![Notice::new(
                NoticeLevel::Info,
                format!(
                    "Timer stopped for: {} ({}m logged)",
                    outcome.task.title, outcome.minutes_logged
                ),
            )],
            Event::TaskCompleted(outcome) => {
                let message = if outcome.minutes_logged > 0 {
                    format!(
                        "Task completed successfully! {} logged",
                        crate::cli::format_minutes(outcome.minutes_logged)
                    )
                } else {
                    "Task completed successfully!".to_string()
                };
                let mut notices = vec![Notice::new(NoticeLevel::Success, message)];
                notices.extend(warning_notices(&outcome.warnings));
                notices
            }
            Event::Rejected { kind, message } => {
                let level = if kind == "PERSISTENCE_FAILURE" {
                    NoticeLevel::Error
                } else {
                    NoticeLevel::Warning
                };
                vec![Notice::new(level, message.clone())]
            }
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Event::Rejected { .. })
    }
}

fn warning_notices(warnings: &[String]) -> impl Iterator<Item = Notice> + '_ {
    warnings
        .iter()
        .map(|w| Notice::new(NoticeLevel::Warning, w.clone()))
}

/// Выполнить команду; ошибки превращаются в Rejected, состояние при этом не меняется
pub async fn dispatch<T, P>(engine: &TimerEngine<T, P>, command: Command) -> Event
where
    T: TaskService,
    P: ProjectService,
{
    let result = match command {
        Command::StartTimer { task_id } => engine.start_timer(task_id).await.map(Event::TimerStarted),
        Command::StopTimer => engine.stop_timer().await.map(Event::TimerStopped),
        Command::Complete { task_id, minutes } => engine
            .complete_task(task_id, minutes)
            .await
            .map(Event::TaskCompleted),
    };
    match result {
        Ok(event) => event,
        Err(e) => {
            if e.is_no_op() {
                warn!("[COMMAND] Rejected (no-op): {}", e);
            } else {
                warn!("[COMMAND] Failed: {}", e);
            }
            Event::rejected(&e)
        }
    }
}

pub async fn on_start_timer<T, P>(engine: &TimerEngine<T, P>, task_id: TaskId) -> Event
where
    T: TaskService,
    P: ProjectService,
{
    dispatch(engine, Command::StartTimer { task_id }).await
}

pub async fn on_stop_timer<T, P>(engine: &TimerEngine<T, P>) -> Event
where
    T: TaskService,
    P: ProjectService,
{
    dispatch(engine, Command::StopTimer).await
}

pub async fn on_complete<T, P>(
    engine: &TimerEngine<T, P>,
    task_id: TaskId,
    minutes: Option<u32>,
) -> Event
where
    T: TaskService,
    P: ProjectService,
{
    dispatch(engine, Command::Complete { task_id, minutes }).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let cmd: Command =
            serde_json::from_str(r#"{"command":"START_TIMER","taskId":7}"#).unwrap();
        assert_eq!(cmd, Command::StartTimer { task_id: 7 });

        let cmd: Command = serde_json::from_str(r#"{"command":"STOP_TIMER"}"#).unwrap();
        assert_eq!(cmd, Command::StopTimer);

        let cmd: Command =
            serde_json::from_str(r#"{"command":"COMPLETE","taskId":3}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Complete {
                task_id: 3,
                minutes: None
            }
        );
    }

    #[test]
    fn test_rejected_notice_levels() {
        let event = Event::rejected(&TimerError::InvalidTransition("No active timer".into()));
        let notices = event.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(notices[0].message.contains("No active timer"));

        let event = Event::rejected(&TimerError::PersistenceFailure("disk".into()));
        assert_eq!(event.notices()[0].level, NoticeLevel::Error);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "REJECTED");
        assert_eq!(json["kind"], "PERSISTENCE_FAILURE");
    }
}
