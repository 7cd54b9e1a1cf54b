use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info, warn};
pub mod cli;
pub mod commands;
pub mod config;
mod database;
pub mod engine;
mod error;
pub mod models;
pub mod services;
use crate::cli::{format_elapsed, format_minutes, CliAction};
use crate::config::AppConfig;
use crate::engine::{TimerEngine, TimerStore};
use crate::services::ProjectService;
pub use database::{round_hours, Database};
pub use error::TimerError;


type Engine = TimerEngine<Database, Database>;

/// Open the database, backing up and recreating it once if it is corrupted.
fn open_database(db_path: &Path) -> Result<Database, String> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            let msg = match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    "Permission denied. Check data directory is writable."
                }
                std::io::ErrorKind::StorageFull => "Disk full. Free space on drive.",
                _ => "Failed to create data directory.",
            };
            format!("{} Path: {} — {}", msg, dir.display(), e)
        })?;
    }

    let db_path_str = db_path.to_str().ok_or_else(|| {
        format!(
            "Database path contains invalid UTF-8: {}",
            db_path.display()
        )
    })?;

    match Database::new(db_path_str) {
        Ok(db) => Ok(db),
        Err(e) => {
            let err_str = e.to_string();
            let is_corruption = err_str.contains("corruption") || err_str.contains("integrity");
            if !is_corruption || !db_path.exists() {
                return Err(format!("Failed to initialize database: {}", e));
            }
            let backup_path = db_path.with_extension(format!(
                "db.corrupted.{}",
                chrono::Utc::now().timestamp()
            ));
            std::fs::rename(db_path, &backup_path).map_err(|rename_e| {
                warn!(
                    "[DB] Failed to rename corrupted DB to {:?}: {}",
                    backup_path, rename_e
                );
                format!("Database corrupted and could not backup: {}", e)
            })?;
            info!(
                "[DB] Corrupted DB backed up to {:?}, starting fresh",
                backup_path
            );
            Database::new(db_path_str)
                .map_err(|e2| format!("Failed to create fresh database: {}", e2))
        }
    }
}

pub fn run() -> Result<(), String> {
    let config = AppConfig::from_env();

    // Логирование: по умолчанию info (если RUST_LOG не задан)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let db = Arc::new(open_database(&config.db_path)?);
    info!("[DB] Using database at {}", config.db_path.display());

    // Один логический поток: все операции таймера кооперативны
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let engine = TimerEngine::new(
            db.clone(),
            db.clone(),
            TimerStore::with_db(db.clone()),
            config.engine.clone(),
        );
        if let Some(active) = engine.restore().await {
            println!(
                "Resumed timer for task {} ({} elapsed)",
                active.task_id,
                format_elapsed(active.elapsed_seconds)
            );
        }

        // Тики только для отображения
        let mut ticks = engine.subscribe();
        tokio::spawn(async move {
            while ticks.changed().await.is_ok() {
                let snapshot = ticks.borrow_and_update().clone();
                if let Some(active) = snapshot.active {
                    debug!(
                        "[CLOCK] task={} elapsed={}",
                        active.task_id,
                        format_elapsed(active.elapsed_seconds)
                    );
                }
            }
        });

        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !handle_line(&engine, &db, &line).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("[CLI] Failed to read stdin: {}", e);
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("[SHUTDOWN] Interrupt received");
                    break;
                }
            }
        }

        engine.shutdown().await;
    });
    Ok(())
}

/// Returns false when the loop should end.
async fn handle_line(engine: &Engine, db: &Database, line: &str) -> bool {
    let action = match cli::parse_line(line) {
        Ok(action) => action,
        Err(e) => {
            // Help output and usage errors are both rendered by clap
            println!("{}", e.to_string().trim_end());
            return true;
        }
    };

    if let Some(command) = action.command() {
        let event = commands::dispatch(engine, command).await;
        if event.is_rejected() {
            debug!("[CLI] Command rejected, state unchanged");
        } else {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("[CLI] Failed to encode event: {}", e),
            }
        }
        for notice in event.notices() {
            println!("[{}] {}", notice.level, notice.message);
        }
        return true;
    }

    match action {
        CliAction::Status => {
            let state = engine.get_state();
            if !state.is_running() {
                println!("no active timer");
            }
            if let Some(active) = state.active {
                println!(
                    "task {} running for {}",
                    active.task_id,
                    format_elapsed(active.elapsed_seconds)
                );
            }
        }
        CliAction::List => match db.list_tasks() {
            Ok(tasks) => {
                for task in tasks {
                    println!(
                        "{:>4}  {:<11}  {:>8} / {:<8}  {}",
                        task.id,
                        task.status,
                        format_minutes(task.actual_minutes),
                        format_minutes(task.estimated_minutes),
                        task.title
                    );
                }
            }
            Err(e) => println!("error: {}", database::db_error_to_user_message(&e)),
        },
        CliAction::Add {
            estimated_minutes,
            project,
            title,
        } => {
            if let Some(project_id) = project {
                // A task must not point at a project that rollups cannot reach
                if let Err(e) = ProjectService::get_project(db, project_id).await {
                    println!("error: {}", e);
                    return true;
                }
            }
            let mut new_task = models::NewTask::new(title.join(" "), estimated_minutes);
            new_task.project_id = project;
            match db.create_task(&new_task) {
                Ok(task) => println!("created task {}: {}", task.id, task.title),
                Err(e) => println!("error: {}", database::db_error_to_user_message(&e)),
            }
        }
        CliAction::Project { name } => match db.create_project(&name.join(" "), 0.0) {
            Ok(project) => println!("created project {}: {}", project.id, project.name),
            Err(e) => println!("error: {}", database::db_error_to_user_message(&e)),
        },
        CliAction::Quit => return false,
        CliAction::Start { .. } | CliAction::Stop | CliAction::Complete { .. } => {}
    }
    true
}
