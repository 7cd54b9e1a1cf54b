use crate::engine::aggregator;
use crate::engine::status::{self, TaskEvent};
use crate::engine::{CompleteOutcome, StartOutcome, StopOutcome, TimerEngine, TimerStateResponse};
use crate::error::TimerError;
use crate::models::{now_ms, TaskId, TaskStatus, TaskUpdate, TimerSession};
use crate::services::{ProjectService, TaskService};
use tracing::{debug, error, info, warn};

/// Сколько раз перепроверяем сессию после await, прежде чем сдаться
const MAX_REVALIDATION_ATTEMPTS: u8 = 3;

impl<T, P> TimerEngine<T, P>
where
    T: TaskService,
    P: ProjectService,
{
    /// Переход: pending → in-progress
    /// Активный таймер другой задачи сначала останавливается тем же путём, что и stop_timer()
    pub async fn start_timer(&self, task_id: TaskId) -> Result<StartOutcome, TimerError> {
        let task = self.tasks.get(task_id).await?;
        // Reject before touching the running timer: a completed task must not stop it
        start_status(task.status)?;

        let mut stopped = None;
        let mut attempts = 0;
        while let Some(current) = self.current_session() {
            if current.task_id == task_id {
                warn!("[FSM] Invalid transition: timer already running for task {}", task_id);
                return Err(TimerError::InvalidTransition(format!(
                    "Timer is already running for task {}",
                    task_id
                )));
            }
            attempts += 1;
            if attempts > MAX_REVALIDATION_ATTEMPTS {
                error!(
                    "[TIMER] Active timer kept changing while starting task {}",
                    task_id
                );
                return Err(TimerError::InvalidTransition(
                    "Another timer operation is in progress".to_string(),
                ));
            }
            info!(
                "[TIMER] Stopping timer for task {} before starting task {}",
                current.task_id, task_id
            );
            match self.stop_session(current).await {
                Ok(outcome) => stopped = Some(outcome),
                // The previous session is already released; nothing left to bank
                Err(e) if e.is_no_op() => warn!("[TIMER] Previous timer dropped: {}", e),
                Err(e) => return Err(e),
            }
        }

        // Re-read after the suspension points above
        let task = if stopped.is_some() {
            self.tasks.get(task_id).await?
        } else {
            task
        };
        let next = start_status(task.status)?;
        if task.status == TaskStatus::InProgress {
            // The loop above ruled out a live session for this task
            warn!(
                "[TIMER] Task {} is in-progress without an active timer, starting it again",
                task_id
            );
        }

        let now = now_ms();
        let update = TaskUpdate {
            status: Some(next),
            timer_started: Some(Some(now)),
            ..Default::default()
        };
        let task = self.tasks.update(task_id, update).await?;
        let session = TimerSession {
            task_id,
            start_time: now,
        };

        // Another start may have slipped in while the update was awaited
        let mut attempts = 0;
        while let Some(other) = self.current_session() {
            if other.task_id == task_id {
                // A concurrent start for the same task won; its session is consistent
                return Err(TimerError::InvalidTransition(format!(
                    "Timer is already running for task {}",
                    task_id
                )));
            }
            attempts += 1;
            if attempts > MAX_REVALIDATION_ATTEMPTS {
                error!("[TIMER] Could not displace concurrent timer for task {}", other.task_id);
                return Err(TimerError::InvalidTransition(
                    "Another timer operation is in progress".to_string(),
                ));
            }
            warn!(
                "[TIMER] Timer for task {} started concurrently, stopping it",
                other.task_id
            );
            if let Err(e) = self.stop_session(other).await {
                warn!("[TIMER] Failed to stop concurrent timer: {}", e);
            }
        }

        let mut warnings = Vec::new();
        if let Err(e) = self.store.save(&session) {
            error!("[STORE] Failed to persist timer for task {}: {}", task_id, e);
            warnings.push(format!("Timer will not survive a restart: {}", e));
        }
        self.install_session(session);

        info!("[TIMER] Timer started: task={}, startTime={}", task_id, now);
        Ok(StartOutcome {
            task,
            session,
            stopped,
            warnings,
        })
    }

    /// Переход: in-progress → pending, минуты добавляются к задаче
    /// Нет активного таймера — InvalidTransition (no-op)
    pub async fn stop_timer(&self) -> Result<StopOutcome, TimerError> {
        let session = self.current_session().ok_or_else(|| {
            warn!("[FSM] Invalid transition: stop requested with no active timer");
            TimerError::InvalidTransition("No active timer".to_string())
        })?;
        self.stop_session(session).await
    }

    /// Единый путь остановки: явный stop и старт другой задачи
    async fn stop_session(&self, session: TimerSession) -> Result<StopOutcome, TimerError> {
        let now = now_ms();
        if now < session.start_time {
            warn!(
                "[TIMER] Clock skew detected: now ({}) < startTime ({}). Counting 0s.",
                now, session.start_time
            );
        }
        let elapsed = session.elapsed_seconds(now);
        let minutes = aggregator::minutes_worked(elapsed);

        let task = match self.tasks.get(session.task_id).await {
            Ok(task) => task,
            Err(e) => return Err(self.release_on_missing_task(session, e)),
        };
        if let Err(e) = status::transition(task.status, TaskEvent::StopTimer) {
            // Session points at a task that is not in progress: drop it
            self.release_session(session);
            return Err(e);
        }

        let task = match self
            .tasks
            .update(task.id, aggregator::stop_update(&task, minutes))
            .await
        {
            Ok(task) => task,
            Err(e) => return Err(self.release_on_missing_task(session, e)),
        };
        self.release_session(session);

        info!(
            "[TIMER] Timer stopped: task={}, elapsed={}s, minutes={}, actualMinutes={}",
            task.id, elapsed, minutes, task.actual_minutes
        );
        Ok(StopOutcome {
            task,
            minutes_logged: minutes,
            elapsed_seconds: elapsed,
        })
    }

    /// Переход: pending | in-progress → completed
    /// `manual_minutes` — время из ручного ввода; None — «без времени»
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        manual_minutes: Option<u32>,
    ) -> Result<CompleteOutcome, TimerError> {
        let task = self.tasks.get(task_id).await?;
        status::transition(task.status, TaskEvent::Complete)?;

        let now = now_ms();
        let active_elapsed = self
            .current_session()
            .filter(|s| s.task_id == task_id)
            .map(|s| s.elapsed_seconds(now));
        let split = aggregator::completion_minutes(
            manual_minutes.filter(|m| *m > 0),
            active_elapsed,
            self.config.fold_active_elapsed,
        );

        // Status, minutes and completedAt commit together or not at all
        let task = self
            .tasks
            .update(
                task_id,
                aggregator::completion_update(&task, split.task_minutes, now),
            )
            .await?;

        // Re-check after the await: the timed task may have changed meanwhile
        let timer_stopped = match self.current_session() {
            Some(current) if current.task_id == task_id => self.release_session(current),
            _ => false,
        };

        let mut warnings = Vec::new();
        let mut project = None;
        match (task.project_id, split.project_minutes) {
            (Some(project_id), minutes) if minutes > 0 => {
                // Best effort: the task commit above stands regardless
                match self.projects.log_time(project_id, minutes).await {
                    Ok(updated) => {
                        info!(
                            "[ROLLUP] Project {}: +{}m, totalActualHours={}",
                            project_id, minutes, updated.total_actual_hours
                        );
                        project = Some(updated);
                    }
                    Err(e) => {
                        warn!(
                            "[ROLLUP] Failed to log {}m to project {}: {}",
                            minutes, project_id, e
                        );
                        warnings.push(format!("Project time not updated: {}", e));
                    }
                }
            }
            (None, minutes) if minutes > 0 => {
                debug!("[ROLLUP] Task {} has no project, {}m not rolled up", task_id, minutes);
            }
            _ => {}
        }

        info!(
            "[TIMER] Task completed: task={}, minutes={}, actualMinutes={}, timerStopped={}",
            task_id, split.task_minutes, task.actual_minutes, timer_stopped
        );
        Ok(CompleteOutcome {
            task,
            minutes_logged: split.task_minutes,
            project_minutes: split.project_minutes,
            project,
            timer_stopped,
            warnings,
        })
    }

    /// NotFound while stopping: the timed task is gone, so the session must go too
    fn release_on_missing_task(&self, session: TimerSession, e: TimerError) -> TimerError {
        if let TimerError::NotFound(msg) = &e {
            warn!("[TIMER] {}. Releasing its timer.", msg);
            self.release_session(session);
        }
        e
    }
}

/// Status a task moves to when its timer starts.
/// `InProgress` is accepted: callers check that no session is running for the task,
/// so such a task has lost its timer and may be started again.
fn start_status(from: TaskStatus) -> Result<TaskStatus, TimerError> {
    match from {
        TaskStatus::InProgress => Ok(TaskStatus::InProgress),
        other => status::transition(other, TaskEvent::StartTimer),
    }
}

impl<T, P> TimerEngine<T, P> {
    /// Текущее состояние таймера
    pub fn get_state(&self) -> TimerStateResponse {
        match self.current_session() {
            Some(session) => {
                TimerStateResponse::running(session, session.elapsed_seconds(now_ms()))
            }
            None => TimerStateResponse::idle(),
        }
    }

    /// Release the clock on teardown. The stored timer is kept so a restart resumes it.
    pub async fn shutdown(&self) {
        let handle = match self.clock_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            crate::engine::TimerClock::stop(handle).await;
        }
        info!("[SHUTDOWN] Timer clock released, stored timer kept");
    }

    pub(crate) fn current_session(&self) -> Option<TimerSession> {
        match self.session.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => {
                error!("[TIMER] Session mutex poisoned, using last known value");
                *poisoned.into_inner()
            }
        }
    }

    /// Сбросить сессию, если она всё ещё та же (compare-and-clear)
    /// Возвращает true, если сессия была сброшена
    pub(crate) fn release_session(&self, session: TimerSession) -> bool {
        let released = {
            let mut slot = match self.session.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *slot == Some(session) {
                *slot = None;
                true
            } else {
                false
            }
        };
        if !released {
            debug!(
                "[TIMER] Session for task {} already replaced, leaving current timer alone",
                session.task_id
            );
            return false;
        }

        if let Err(e) = self.store.clear() {
            error!("[STORE] Failed to clear timer record: {}", e);
        }
        let handle = match self.clock_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut handle) = handle {
            handle.cancel();
        }
        self.ticks.send_replace(TimerStateResponse::idle());
        true
    }
}
