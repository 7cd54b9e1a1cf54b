use crate::models::{Task, TaskStatus, TaskUpdate};

/// Минуты за сессию: max(1, round(elapsed / 60))
/// Нижняя граница в одну минуту — быстрый start/stop не даёт нулевых записей
pub fn minutes_worked(elapsed_seconds: u64) -> u32 {
    let minutes = (elapsed_seconds as f64 / 60.0).round();
    let minutes = if minutes > f64::from(u32::MAX) {
        u32::MAX
    } else {
        minutes as u32
    };
    minutes.max(1)
}

/// Parse a manual hours entry ("2.5") into whole minutes.
///
/// Reads the longest numeric prefix of the trimmed input, so `"1.5h"` is 90 minutes.
/// Anything that is not a finite positive number, or rounds to zero minutes, is `None`.
pub fn parse_hours_input(input: &str) -> Option<u32> {
    let trimmed = input.trim_start();
    let hours = (1..=trimmed.len())
        .rev()
        .filter(|end| trimmed.is_char_boundary(*end))
        .find_map(|end| trimmed[..end].parse::<f64>().ok())?;

    if !hours.is_finite() || hours <= 0.0 {
        return None;
    }
    let minutes = (hours * 60.0).round();
    if minutes < 1.0 || minutes > f64::from(u32::MAX) {
        return None;
    }
    Some(minutes as u32)
}

/// Update for a timer stop: bank the minutes, back to pending, clear the timer stamp.
pub fn stop_update(task: &Task, minutes: u32) -> TaskUpdate {
    TaskUpdate {
        status: Some(TaskStatus::Pending),
        actual_minutes: Some(task.actual_minutes.saturating_add(minutes)),
        timer_started: Some(None),
        completed_at: None,
    }
}

/// Update for completion. `minutes` is added to the task, never assigned.
pub fn completion_update(task: &Task, minutes: u32, completed_at: u64) -> TaskUpdate {
    TaskUpdate {
        status: Some(TaskStatus::Completed),
        actual_minutes: if minutes > 0 {
            Some(task.actual_minutes.saturating_add(minutes))
        } else {
            None
        },
        timer_started: Some(None),
        completed_at: Some(completed_at),
    }
}

/// Минуты, которые попадут в задачу при завершении
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionMinutes {
    /// Added to `actual_minutes`
    pub task_minutes: u32,
    /// Rolled up into the owning project
    pub project_minutes: u32,
}

/// Decide how manual minutes and a running timer combine on completion.
///
/// Manual time wins over the running timer unless `fold_active` is set.
/// Without manual time the running timer is banked like a stop, and like a stop
/// it is not attributed to the project.
pub fn completion_minutes(
    manual: Option<u32>,
    active_elapsed_seconds: Option<u64>,
    fold_active: bool,
) -> CompletionMinutes {
    let active = active_elapsed_seconds.map(minutes_worked);
    match (manual, active) {
        (Some(m), Some(a)) if fold_active => CompletionMinutes {
            task_minutes: m.saturating_add(a),
            project_minutes: m.saturating_add(a),
        },
        (Some(m), _) => CompletionMinutes {
            task_minutes: m,
            project_minutes: m,
        },
        (None, Some(a)) => CompletionMinutes {
            task_minutes: a,
            project_minutes: if fold_active { a } else { 0 },
        },
        (None, None) => CompletionMinutes {
            task_minutes: 0,
            project_minutes: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn task(actual: u32) -> Task {
        Task {
            id: 1,
            title: "Draft".to_string(),
            priority: Priority::Medium,
            status: TaskStatus::InProgress,
            estimated_minutes: 30,
            actual_minutes: actual,
            project_id: Some(1),
            timer_started: Some(1_000),
            completed_at: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_minutes_worked_rounds() {
        assert_eq!(minutes_worked(125), 2);
        assert_eq!(minutes_worked(150), 3);
        assert_eq!(minutes_worked(3600), 60);
    }

    #[test]
    fn test_minutes_worked_floor_of_one() {
        assert_eq!(minutes_worked(10), 1);
        assert_eq!(minutes_worked(0), 1);
    }

    #[test]
    fn test_parse_hours_input() {
        assert_eq!(parse_hours_input("2.5"), Some(150));
        assert_eq!(parse_hours_input(" 1.5h"), Some(90));
        assert_eq!(parse_hours_input("0.25"), Some(15));
        assert_eq!(parse_hours_input("abc"), None);
        assert_eq!(parse_hours_input("-1"), None);
        assert_eq!(parse_hours_input("0"), None);
        assert_eq!(parse_hours_input(""), None);
        assert_eq!(parse_hours_input("inf"), None);
        assert_eq!(parse_hours_input("NaN"), None);
    }

    #[test]
    fn test_stop_update_increments() {
        let update = stop_update(&task(40), 2);
        assert_eq!(update.actual_minutes, Some(42));
        assert_eq!(update.status, Some(TaskStatus::Pending));
        assert_eq!(update.timer_started, Some(None));
        assert_eq!(update.completed_at, None);
    }

    #[test]
    fn test_completion_update_never_decreases() {
        let update = completion_update(&task(200), 150, 99);
        assert_eq!(update.actual_minutes, Some(350));
        assert_eq!(update.completed_at, Some(99));

        let update = completion_update(&task(200), 0, 99);
        assert_eq!(update.actual_minutes, None);
        assert_eq!(update.status, Some(TaskStatus::Completed));
    }

    #[test]
    fn test_completion_minutes_policy() {
        // manual entry replaces the running timer
        assert_eq!(
            completion_minutes(Some(150), Some(600), false),
            CompletionMinutes {
                task_minutes: 150,
                project_minutes: 150
            }
        );
        // fold adds it
        assert_eq!(
            completion_minutes(Some(150), Some(600), true),
            CompletionMinutes {
                task_minutes: 160,
                project_minutes: 160
            }
        );
        // no manual time: banked on the task only
        assert_eq!(
            completion_minutes(None, Some(125), false),
            CompletionMinutes {
                task_minutes: 2,
                project_minutes: 0
            }
        );
        assert_eq!(
            completion_minutes(None, None, true),
            CompletionMinutes {
                task_minutes: 0,
                project_minutes: 0
            }
        );
    }
}
