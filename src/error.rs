use std::fmt;

/// Ошибки ядра учёта времени
/// NotFound и InvalidTransition — локальные no-op с уведомлением,
/// PersistenceFailure — операция не выполнена
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    NotFound(String),
    InvalidTransition(String),
    PersistenceFailure(String),
}

impl TimerError {
    /// Short machine-readable kind, used in events sent to the presentation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            TimerError::NotFound(_) => "NOT_FOUND",
            TimerError::InvalidTransition(_) => "INVALID_TRANSITION",
            TimerError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// Recoverable errors leave every entity untouched.
    pub fn is_no_op(&self) -> bool {
        matches!(
            self,
            TimerError::NotFound(_) | TimerError::InvalidTransition(_)
        )
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::NotFound(s) => write!(f, "Not found: {}", s),
            TimerError::InvalidTransition(s) => write!(f, "Invalid transition: {}", s),
            TimerError::PersistenceFailure(s) => write!(f, "Persistence failure: {}", s),
        }
    }
}

impl std::error::Error for TimerError {}

impl From<rusqlite::Error> for TimerError {
    fn from(e: rusqlite::Error) -> Self {
        TimerError::PersistenceFailure(crate::database::db_error_to_user_message(&e))
    }
}
