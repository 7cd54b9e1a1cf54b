use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::models::{
    now_ms, NewTask, Priority, Project, ProjectId, Task, TaskId, TaskStatus, TaskUpdate,
};
use rusqlite::Error::InvalidParameterName;

/// Log IO-related DB errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation — caller still returns Err.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!(
                    "[DB] {}: Disk full. Free space on drive or check data directory.",
                    context
                );
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

/// Convert rusqlite errors to user-friendly messages for notifications.
pub fn db_error_to_user_message(e: &rusqlite::Error) -> String {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => "Storage unavailable (Disk Full?)".to_string(),
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                "Storage unavailable (Permission denied?)".to_string()
            }
            ErrorCode::SystemIoFailure => "Storage unavailable (I/O error?)".to_string(),
            _ => format!("Database error: {}", e),
        }
    } else {
        format!("Database error: {}", e)
    }
}

/// Ключ app_meta, под которым хранится активный таймер
pub const ACTIVE_TIMER_KEY: &str = "active_timer";

const TASK_COLUMNS: &str = "id, title, priority, status, estimated_minutes, actual_minutes, \
     project_id, timer_started, completed_at, created_at";

const PROJECT_COLUMNS: &str =
    "id, name, total_estimated_hours, total_actual_hours, created_at";

fn task_from_row(row: &Row<'_>) -> SqliteResult<Task> {
    let status: String = row.get(3)?;
    let status = status.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let priority: String = row.get(2)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        priority: Priority::parse_lossy(&priority),
        status,
        estimated_minutes: row.get(4)?,
        actual_minutes: row.get(5)?,
        project_id: row.get(6)?,
        timer_started: row.get(7)?,
        completed_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn project_from_row(row: &Row<'_>) -> SqliteResult<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        total_estimated_hours: row.get(2)?,
        total_actual_hours: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Hours rounded to two decimals, as stored on projects.
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Менеджер базы данных
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Безопасная блокировка соединения с обработкой poisoned mutex
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, rusqlite::Error> {
        self.conn.lock().map_err(|e| {
            InvalidParameterName(format!(
                "Database mutex poisoned: {}. A panic occurred while holding the lock. \
                 Please restart the application to recover.",
                e
            ))
        })
    }

    pub fn new(db_path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        // GUARD: Integrity check on startup — detect corruption before init
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(|e| InvalidParameterName(format!("Integrity check failed: {}", e)))?;
        if integrity.to_lowercase() != "ok" {
            return Err(InvalidParameterName(format!(
                "Database corruption detected: {}",
                integrity
            )));
        }

        // WAL survives a crash mid-write better than the default rollback journal
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| {
                warn!(
                    "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                    e
                );
            })
            .ok();
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| {
                warn!("[DB] Failed to enable foreign keys: {}. Continuing.", e);
            })
            .ok();

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Current schema version (PRAGMA user_version). Bump when adding migrations.
    const SCHEMA_VERSION: i32 = 1;

    fn run_migrations(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                total_estimated_hours REAL NOT NULL DEFAULT 0,
                total_actual_hours REAL NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'Medium',
                status TEXT NOT NULL DEFAULT 'pending',
                estimated_minutes INTEGER NOT NULL DEFAULT 0,
                actual_minutes INTEGER NOT NULL DEFAULT 0,
                project_id INTEGER,
                timer_started INTEGER,
                completed_at INTEGER,
                created_at INTEGER NOT NULL
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS app_meta (key TEXT PRIMARY KEY, value TEXT)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id)",
                [],
            )?;
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }

    /// Выполнить запись внутри BEGIN IMMEDIATE транзакции
    /// GUARD: COMMIT или ROLLBACK — без частичных записей
    fn with_immediate_tx<T>(
        conn: &Connection,
        context: &str,
        op: impl FnOnce(&Connection) -> SqliteResult<T>,
    ) -> SqliteResult<T> {
        conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
            log_io_error_if_any(context, &e);
            error!("[DB] {}: failed to begin transaction: {}", context, e);
            e
        })?;

        match op(conn) {
            Ok(value) => {
                conn.execute("COMMIT", []).map_err(|e| {
                    log_io_error_if_any(context, &e);
                    error!("[DB] {}: failed to commit transaction: {}", context, e);
                    let _ = conn.execute("ROLLBACK", []);
                    e
                })?;
                Ok(value)
            }
            Err(e) => {
                log_io_error_if_any(context, &e);
                error!("[DB] {}: {}. Rolling back transaction.", context, e);
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Получить значение из app_meta
    pub fn get_app_meta(&self, key: &str) -> SqliteResult<Option<String>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT value FROM app_meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
    }

    /// Записать значение в app_meta
    pub fn set_app_meta(&self, key: &str, value: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO app_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )
        .map_err(|e| {
            log_io_error_if_any("set_app_meta", &e);
            e
        })?;
        Ok(())
    }

    pub fn delete_app_meta(&self, key: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM app_meta WHERE key = ?1", params![key])
            .map_err(|e| {
                log_io_error_if_any("delete_app_meta", &e);
                e
            })?;
        Ok(())
    }

    /// Создать задачу: status = pending, actual_minutes = 0
    pub fn create_task(&self, new_task: &NewTask) -> SqliteResult<Task> {
        let conn = self.lock_conn()?;
        let now = now_ms();
        conn.execute(
            "INSERT INTO tasks (title, priority, status, estimated_minutes, actual_minutes, project_id, created_at)
     VALUES (?1, ?2, 'pending', ?3, 0, ?4, ?5)",
            params![
                new_task.title,
                new_task.priority.as_str(),
                new_task.estimated_minutes,
                new_task.project_id,
                now
            ],
        )
        .map_err(|e| {
            log_io_error_if_any("create_task", &e);
            e
        })?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![id],
            task_from_row,
        )
    }

    pub fn get_task(&self, id: TaskId) -> SqliteResult<Option<Task>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![id],
            task_from_row,
        )
        .optional()
    }

    pub fn list_tasks(&self) -> SqliteResult<Vec<Task>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM tasks ORDER BY id", TASK_COLUMNS))?;
        let rows = stmt.query_map([], task_from_row)?;
        rows.collect()
    }

    pub fn list_tasks_with_status(&self, status: TaskStatus) -> SqliteResult<Vec<Task>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status = ?1 ORDER BY id",
            TASK_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status.as_str()], task_from_row)?;
        rows.collect()
    }

    /// Применить частичное обновление к задаче одной транзакцией
    /// Возвращает None, если задачи нет
    pub fn update_task(&self, id: TaskId, update: &TaskUpdate) -> SqliteResult<Option<Task>> {
        let conn = self.lock_conn()?;
        Self::with_immediate_tx(&conn, "update_task", |conn| {
            let existing = conn
                .query_row(
                    &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                    params![id],
                    task_from_row,
                )
                .optional()?;
            let mut task = match existing {
                Some(task) => task,
                None => return Ok(None),
            };
            update.apply(&mut task);
            conn.execute(
                "UPDATE tasks SET status = ?2, actual_minutes = ?3, timer_started = ?4, completed_at = ?5
     WHERE id = ?1",
                params![
                    id,
                    task.status.as_str(),
                    task.actual_minutes,
                    task.timer_started,
                    task.completed_at
                ],
            )?;
            Ok(Some(task))
        })
    }

    pub fn create_project(&self, name: &str, estimated_hours: f64) -> SqliteResult<Project> {
        let conn = self.lock_conn()?;
        let now = now_ms();
        conn.execute(
            "INSERT INTO projects (name, total_estimated_hours, total_actual_hours, created_at)
     VALUES (?1, ?2, 0, ?3)",
            params![name, estimated_hours, now],
        )
        .map_err(|e| {
            log_io_error_if_any("create_project", &e);
            e
        })?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            params![id],
            project_from_row,
        )
    }

    pub fn get_project(&self, id: ProjectId) -> SqliteResult<Option<Project>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            params![id],
            project_from_row,
        )
        .optional()
    }

    /// Добавить минуты к total_actual_hours проекта
    /// total = round2(total + minutes / 60), единственная запись в это поле
    pub fn log_time_to_project(
        &self,
        id: ProjectId,
        minutes: u32,
    ) -> SqliteResult<Option<Project>> {
        let conn = self.lock_conn()?;
        Self::with_immediate_tx(&conn, "log_time_to_project", |conn| {
            let existing = conn
                .query_row(
                    &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
                    params![id],
                    project_from_row,
                )
                .optional()?;
            let mut project = match existing {
                Some(project) => project,
                None => return Ok(None),
            };
            project.total_actual_hours =
                round_hours(project.total_actual_hours + f64::from(minutes) / 60.0);
            conn.execute(
                "UPDATE projects SET total_actual_hours = ?2 WHERE id = ?1",
                params![id, project.total_actual_hours],
            )?;
            Ok(Some(project))
        })
    }
}
