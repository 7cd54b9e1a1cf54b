use crate::config::EngineConfig;
use crate::models::{Project, Task, TaskId, TimerSession};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
pub mod aggregator;
pub mod clock;
mod core;
mod db;
pub mod status;

pub use clock::{ClockHandle, TimerClock};
pub use db::TimerStore;

/// Timer Engine — фасад учёта времени
/// Единственная активная сессия хранится здесь (кеш) и в TimerStore (долговременная копия)
/// Mutex никогда не удерживается через .await
pub struct TimerEngine<T, P> {
    pub(crate) tasks: Arc<T>,
    pub(crate) projects: Arc<P>,
    pub(crate) store: TimerStore,
    pub(crate) clock: TimerClock,
    /// Не более одного тика одновременно
    pub(crate) clock_handle: Mutex<Option<ClockHandle>>,
    /// Активная сессия — единственный источник истины в памяти
    pub(crate) session: Mutex<Option<TimerSession>>,
    pub(crate) ticks: Arc<watch::Sender<TimerStateResponse>>,
    pub(crate) config: EngineConfig,
}

/// Активный таймер для API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimer {
    pub task_id: TaskId,
    /// Epoch ms
    pub started_at: u64,
    pub elapsed_seconds: u64,
}

/// Snapshot of the timer as seen by the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStateResponse {
    pub active: Option<ActiveTimer>,
}

impl TimerStateResponse {
    pub fn idle() -> Self {
        Self { active: None }
    }

    pub fn running(session: TimerSession, elapsed_seconds: u64) -> Self {
        Self {
            active: Some(ActiveTimer {
                task_id: session.task_id,
                started_at: session.start_time,
                elapsed_seconds,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }
}

/// Результат остановки таймера
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub task: Task,
    pub minutes_logged: u32,
    pub elapsed_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub task: Task,
    pub session: TimerSession,
    /// Previous timer stopped to keep a single active session
    pub stopped: Option<StopOutcome>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOutcome {
    pub task: Task,
    /// Minutes added to the task
    pub minutes_logged: u32,
    /// Minutes rolled up into the project
    pub project_minutes: u32,
    pub project: Option<Project>,
    pub timer_stopped: bool,
    pub warnings: Vec<String>,
}

impl<T, P> TimerEngine<T, P> {
    /// Создать движок без восстановления состояния (восстановление — `restore()`)
    pub fn new(tasks: Arc<T>, projects: Arc<P>, store: TimerStore, config: EngineConfig) -> Self {
        let (ticks, _) = watch::channel(TimerStateResponse::idle());
        Self {
            tasks,
            projects,
            store,
            clock: TimerClock::new(config.tick_interval),
            clock_handle: Mutex::new(None),
            session: Mutex::new(None),
            ticks: Arc::new(ticks),
            config,
        }
    }

    /// Receive a snapshot on every tick and on every start / stop.
    pub fn subscribe(&self) -> watch::Receiver<TimerStateResponse> {
        self.ticks.subscribe()
    }
}
