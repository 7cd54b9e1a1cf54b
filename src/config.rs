use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const ENV_DB_PATH: &str = "TASKTIMER_DB_PATH";
pub const ENV_FOLD_ACTIVE_ELAPSED: &str = "TASKTIMER_FOLD_ACTIVE_ELAPSED";
pub const ENV_TICK_MS: &str = "TASKTIMER_TICK_MS";

const DB_FILE_NAME: &str = "tasktimer.db";

/// Конфигурация движка таймера
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// When a timed task is completed with manual time, also add the running timer's minutes.
    /// Without manual time the running timer is always banked.
    pub fold_active_elapsed: bool,
    /// Display tick period
    pub tick_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fold_active_elapsed: false,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Конфигурация приложения (путь к БД, фильтр логов, движок)
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_filter: String,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_filter: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by environment variables. Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_FOLD_ACTIVE_ELAPSED) {
            match parse_bool(&raw) {
                Some(value) => config.engine.fold_active_elapsed = value,
                None => warn!(
                    "[CONFIG] Ignoring {}={:?}: expected true/false",
                    ENV_FOLD_ACTIVE_ELAPSED, raw
                ),
            }
        }
        if let Some(raw) = lookup(ENV_TICK_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.engine.tick_interval = Duration::from_millis(ms),
                _ => warn!(
                    "[CONFIG] Ignoring {}={:?}: expected a positive number of milliseconds",
                    ENV_TICK_MS, raw
                ),
            }
        }
        config
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Platform data dir, falling back to the working directory.
fn default_db_path() -> PathBuf {
    match ProjectDirs::from("com", "tasktimer", "tasktimer") {
        Some(dirs) => dirs.data_dir().join(DB_FILE_NAME),
        None => PathBuf::from(DB_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None);
        assert!(!config.engine.fold_active_elapsed);
        assert_eq!(config.engine.tick_interval, Duration::from_secs(1));
        assert_eq!(config.log_filter, "info");
        assert!(config.db_path.ends_with(DB_FILE_NAME));
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/tmp/custom.db"),
            (ENV_FOLD_ACTIVE_ELAPSED, "yes"),
            (ENV_TICK_MS, "250"),
            ("RUST_LOG", "debug"),
        ]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.db"));
        assert!(config.engine.fold_active_elapsed);
        assert_eq!(config.engine.tick_interval, Duration::from_millis(250));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_invalid_values_ignored() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (ENV_FOLD_ACTIVE_ELAPSED, "maybe"),
            (ENV_TICK_MS, "0"),
        ]));
        assert!(!config.engine.fold_active_elapsed);
        assert_eq!(config.engine.tick_interval, Duration::from_secs(1));
    }
}
