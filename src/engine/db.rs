use crate::database::{Database, ACTIVE_TIMER_KEY};
use crate::engine::{ActiveTimer, TimerEngine, TimerStateResponse};
use crate::error::TimerError;
use crate::models::{now_ms, Task, TaskStatus, TaskUpdate, TimerSession};
use crate::services::TaskService;
use std::cmp::Reverse;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Долговременное хранилище активного таймера
/// Одна запись `{"taskId", "startTime"}` под ключом `active_timer` в app_meta
/// Без БД (тесты, fallback) запись живёт только в памяти
pub struct TimerStore {
    db: Option<Arc<Database>>,
    memory: Mutex<Option<TimerSession>>,
}

impl TimerStore {
    pub fn with_db(db: Arc<Database>) -> Self {
        Self {
            db: Some(db),
            memory: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            db: None,
            memory: Mutex::new(None),
        }
    }

    pub fn save(&self, session: &TimerSession) -> Result<(), TimerError> {
        let db = match &self.db {
            Some(db) => db,
            None => {
                self.set_memory(Some(*session));
                return Ok(());
            }
        };
        let value = serde_json::to_string(session).map_err(|e| {
            TimerError::PersistenceFailure(format!("Failed to encode timer record: {}", e))
        })?;
        db.set_app_meta(ACTIVE_TIMER_KEY, &value)?;
        Ok(())
    }

    /// GUARD: НИКОГДА не крашиться на ошибке чтения — деградируем до «нет таймера»
    pub fn load(&self) -> Option<TimerSession> {
        let db = match &self.db {
            Some(db) => db,
            None => return self.memory.lock().map(|m| *m).unwrap_or(None),
        };
        match db.get_app_meta(ACTIVE_TIMER_KEY) {
            Ok(Some(raw)) if !raw.trim().is_empty() => {
                match serde_json::from_str::<TimerSession>(&raw) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        error!(
                            "[STORE] Unreadable timer record {:?}: {}. Treating as no active timer.",
                            raw, e
                        );
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(e) => {
                error!(
                    "[STORE] Failed to read timer record: {}. Treating as no active timer.",
                    e
                );
                None
            }
        }
    }

    pub fn clear(&self) -> Result<(), TimerError> {
        match &self.db {
            Some(db) => {
                db.delete_app_meta(ACTIVE_TIMER_KEY)?;
                Ok(())
            }
            None => {
                self.set_memory(None);
                Ok(())
            }
        }
    }

    fn set_memory(&self, value: Option<TimerSession>) {
        match self.memory.lock() {
            Ok(mut slot) => *slot = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl<T, P> TimerEngine<T, P>
where
    T: TaskService,
{
    /// Восстановить таймер из хранилища (вызывается один раз при инициализации)
    /// elapsed пересчитывается как now - startTime, а не с нуля
    /// После этого задачи in-progress без таймера приводятся в согласие с ним
    pub async fn restore(&self) -> Option<ActiveTimer> {
        let restored = self.restore_saved().await;
        if restored.is_none() && self.store.load().is_some() {
            // Record kept after a transient failure; it stays authoritative
            return None;
        }
        self.reconcile_in_progress(restored).await
    }

    async fn restore_saved(&self) -> Option<ActiveTimer> {
        let session = match self.store.load() {
            Some(session) => session,
            None => {
                info!("[RECOVERY] No saved timer found, starting idle");
                return None;
            }
        };

        let now = now_ms();
        if now < session.start_time {
            warn!(
                "[RECOVERY] Clock skew detected: now ({}) < startTime ({}). Elapsed reported as 0.",
                now, session.start_time
            );
        }
        let elapsed = session.elapsed_seconds(now);
        const MAX_REASONABLE_ELAPSED: u64 = 24 * 60 * 60;
        if elapsed > MAX_REASONABLE_ELAPSED {
            // No expiry: the timer keeps running until stopped explicitly
            warn!(
                "[RECOVERY] Timer for task {} has been running for {}s ({} hours)",
                session.task_id,
                elapsed,
                elapsed / 3600
            );
        }

        let task = match self.tasks.get(session.task_id).await {
            Ok(task) => task,
            Err(TimerError::NotFound(msg)) => {
                warn!("[RECOVERY] {}. Discarding saved timer.", msg);
                self.clear_store_logged();
                return None;
            }
            Err(e) => {
                // Transient failure: keep the record for the next start
                error!(
                    "[RECOVERY] Failed to load task {}: {}. Starting without active timer.",
                    session.task_id, e
                );
                return None;
            }
        };

        match task.status {
            TaskStatus::InProgress => {}
            TaskStatus::Completed => {
                warn!(
                    "[RECOVERY] Saved timer points at completed task {}. Discarding.",
                    task.id
                );
                self.clear_store_logged();
                return None;
            }
            TaskStatus::Pending => {
                // The status write was lost; the stored timer wins
                let update = TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    timer_started: Some(Some(session.start_time)),
                    ..Default::default()
                };
                if let Err(e) = self.tasks.update(task.id, update).await {
                    error!(
                        "[RECOVERY] Failed to mark task {} in-progress: {}. Discarding saved timer.",
                        task.id, e
                    );
                    self.clear_store_logged();
                    return None;
                }
                info!("[RECOVERY] Task {} was pending, marked in-progress", task.id);
            }
        }

        self.install_session(session);
        info!(
            "[RECOVERY] Restored timer: task={}, startTime={}, elapsed={}s",
            session.task_id, session.start_time, elapsed
        );
        Some(ActiveTimer {
            task_id: session.task_id,
            started_at: session.start_time,
            elapsed_seconds: elapsed,
        })
    }

    /// Every in-progress task other than the timed one has lost its timer
    /// (crash between the task write and the store write, or a failed store write).
    /// With no timer restored, the most recently started one resumes from `timer_started`;
    /// the rest go back to pending.
    async fn reconcile_in_progress(&self, restored: Option<ActiveTimer>) -> Option<ActiveTimer> {
        let tasks = match self.tasks.list_in_progress().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("[RECOVERY] Failed to list in-progress tasks: {}", e);
                return restored;
            }
        };

        let mut active = restored;
        let mut orphans: Vec<Task> = tasks
            .into_iter()
            .filter(|task| active.map(|a| a.task_id) != Some(task.id))
            .collect();
        orphans.sort_by_key(|task| Reverse(task.timer_started));

        for task in orphans {
            if let (None, Some(start_time)) = (active, task.timer_started) {
                let session = TimerSession {
                    task_id: task.id,
                    start_time,
                };
                if let Err(e) = self.store.save(&session) {
                    error!("[STORE] Failed to persist resumed timer for task {}: {}", task.id, e);
                }
                self.install_session(session);
                let elapsed = session.elapsed_seconds(now_ms());
                warn!(
                    "[RECOVERY] Task {} was in-progress without a saved timer, resumed from timerStarted={} (elapsed={}s)",
                    task.id, start_time, elapsed
                );
                active = Some(ActiveTimer {
                    task_id: task.id,
                    started_at: start_time,
                    elapsed_seconds: elapsed,
                });
                continue;
            }

            let update = TaskUpdate {
                status: Some(TaskStatus::Pending),
                timer_started: Some(None),
                ..Default::default()
            };
            match self.tasks.update(task.id, update).await {
                Ok(_) => warn!(
                    "[RECOVERY] Task {} was in-progress without a timer, moved back to pending",
                    task.id
                ),
                Err(e) => error!(
                    "[RECOVERY] Failed to move orphaned task {} back to pending: {}",
                    task.id, e
                ),
            }
        }
        active
    }

    fn clear_store_logged(&self) {
        if let Err(e) = self.store.clear() {
            error!("[STORE] Failed to clear timer record: {}", e);
        }
    }
}

impl<T, P> TimerEngine<T, P> {
    /// Установить сессию в памяти и запустить тик (старый тик отменяется)
    pub(crate) fn install_session(&self, session: TimerSession) {
        match self.session.lock() {
            Ok(mut slot) => *slot = Some(session),
            Err(poisoned) => *poisoned.into_inner() = Some(session),
        }
        self.start_clock(session);
    }

    pub(crate) fn start_clock(&self, session: TimerSession) {
        let ticks = self.ticks.clone();
        let handle = self.clock.start(session.start_time, move |elapsed| {
            ticks.send_replace(TimerStateResponse::running(session, elapsed));
        });
        self.ticks.send_replace(TimerStateResponse::running(
            session,
            session.elapsed_seconds(now_ms()),
        ));
        let previous = match self.clock_handle.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        // Dropping the previous handle cancels its loop
        drop(previous);
    }
}
