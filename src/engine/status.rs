use crate::error::TimerError;
use crate::models::TaskStatus;
use tracing::warn;

/// Событие жизненного цикла задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    StartTimer,
    StopTimer,
    Complete,
}

/// Строгая FSM статусов задачи
/// pending → in-progress (StartTimer)
/// in-progress → pending (StopTimer)
/// pending | in-progress → completed (Complete), completed — терминальное
pub fn transition(from: TaskStatus, event: TaskEvent) -> Result<TaskStatus, TimerError> {
    match (from, event) {
        (TaskStatus::Pending, TaskEvent::StartTimer) => Ok(TaskStatus::InProgress),
        (TaskStatus::InProgress, TaskEvent::StopTimer) => Ok(TaskStatus::Pending),
        (TaskStatus::Pending | TaskStatus::InProgress, TaskEvent::Complete) => {
            Ok(TaskStatus::Completed)
        }
        (TaskStatus::Completed, TaskEvent::StartTimer) => {
            warn!("[FSM] Invalid transition: completed → in-progress (task is completed)");
            Err(TimerError::InvalidTransition(
                "Cannot start timer on a completed task".to_string(),
            ))
        }
        (TaskStatus::Completed, TaskEvent::Complete) => {
            warn!("[FSM] Invalid transition: completed → completed (already completed)");
            Err(TimerError::InvalidTransition(
                "Task is already completed".to_string(),
            ))
        }
        (TaskStatus::InProgress, TaskEvent::StartTimer) => {
            warn!("[FSM] Invalid transition: in-progress → in-progress (already running)");
            Err(TimerError::InvalidTransition(
                "Timer is already running for this task".to_string(),
            ))
        }
        (from, TaskEvent::StopTimer) => {
            warn!("[FSM] Invalid transition: {} → pending (task is not being timed)", from);
            Err(TimerError::InvalidTransition(format!(
                "Cannot stop timer on a {} task",
                from
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_start_goes_in_progress() {
        assert_eq!(
            transition(TaskStatus::Pending, TaskEvent::StartTimer),
            Ok(TaskStatus::InProgress)
        );
    }

    #[test]
    fn test_in_progress_stop_goes_pending() {
        assert_eq!(
            transition(TaskStatus::InProgress, TaskEvent::StopTimer),
            Ok(TaskStatus::Pending)
        );
    }

    #[test]
    fn test_complete_from_open_states() {
        assert_eq!(
            transition(TaskStatus::Pending, TaskEvent::Complete),
            Ok(TaskStatus::Completed)
        );
        assert_eq!(
            transition(TaskStatus::InProgress, TaskEvent::Complete),
            Ok(TaskStatus::Completed)
        );
    }

    #[test]
    fn test_completed_is_terminal() {
        for event in [TaskEvent::StartTimer, TaskEvent::StopTimer, TaskEvent::Complete] {
            let result = transition(TaskStatus::Completed, event);
            assert!(
                matches!(result, Err(TimerError::InvalidTransition(_))),
                "{:?} must be rejected on a completed task",
                event
            );
        }
    }

    #[test]
    fn test_double_start_rejected() {
        assert!(matches!(
            transition(TaskStatus::InProgress, TaskEvent::StartTimer),
            Err(TimerError::InvalidTransition(_))
        ));
        assert!(matches!(
            transition(TaskStatus::Pending, TaskEvent::StopTimer),
            Err(TimerError::InvalidTransition(_))
        ));
    }
}
