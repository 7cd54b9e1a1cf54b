use crate::commands::Command;
use crate::engine::aggregator::parse_hours_input;
use crate::models::{ProjectId, TaskId};
use clap::{Parser, Subcommand};
use std::iter;

/// Одна строка stdin разбирается как командная строка
#[derive(Parser, Debug)]
#[command(
    name = "tasktimer",
    about = "Track time on tasks: one active timer, minutes banked on stop",
    disable_version_flag = true
)]
struct CliLine {
    #[command(subcommand)]
    action: CliAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliAction {
    /// Start the timer (stops any other timer first)
    Start { task_id: TaskId },
    /// Stop the active timer and bank its minutes
    Stop,
    /// Complete a task, optionally logging hours (e.g. 2.5)
    #[command(alias = "done")]
    Complete {
        task_id: TaskId,
        /// Unparseable hours mean "no time"
        #[arg(allow_hyphen_values = true)]
        hours: Vec<String>,
    },
    /// Show the active timer
    Status,
    /// List tasks
    #[command(alias = "ls")]
    List,
    /// Add a task
    Add {
        /// Estimate in minutes
        estimated_minutes: u32,
        #[arg(short, long)]
        project: Option<ProjectId>,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Add a project
    Project {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    #[command(alias = "exit")]
    Quit,
}

impl CliAction {
    /// Timer commands go to the engine; everything else is handled by the binary.
    pub fn command(&self) -> Option<Command> {
        match self {
            CliAction::Start { task_id } => Some(Command::StartTimer { task_id: *task_id }),
            CliAction::Stop => Some(Command::StopTimer),
            CliAction::Complete { task_id, hours } => {
                let minutes = if hours.is_empty() {
                    None
                } else {
                    parse_hours_input(&hours.join(" "))
                };
                Some(Command::Complete {
                    task_id: *task_id,
                    minutes,
                })
            }
            _ => None,
        }
    }
}

/// Разобрать строку команды; `help` и ошибки приходят как clap::Error с готовым текстом
pub fn parse_line(line: &str) -> Result<CliAction, clap::Error> {
    CliLine::try_parse_from(iter::once("tasktimer").chain(line.split_whitespace()))
        .map(|parsed| parsed.action)
}

/// "0m", "45m", "2h", "2h 30m"
pub fn format_minutes(minutes: u32) -> String {
    if minutes == 0 {
        return "0m".to_string();
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        format!("{}m", mins)
    }
}

/// "MM:SS" under an hour, "H:MM:SS" above
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn command_of(line: &str) -> Option<Command> {
        parse_line(line).unwrap().command()
    }

    #[test]
    fn test_parse_timer_commands() {
        assert_eq!(
            command_of("start 7"),
            Some(Command::StartTimer { task_id: 7 })
        );
        assert_eq!(command_of("  stop "), Some(Command::StopTimer));
        assert_eq!(
            command_of("complete 3 2.5"),
            Some(Command::Complete {
                task_id: 3,
                minutes: Some(150)
            })
        );
        assert_eq!(
            command_of("done 3"),
            Some(Command::Complete {
                task_id: 3,
                minutes: None
            })
        );
    }

    #[test]
    fn test_invalid_hours_mean_no_time() {
        for line in ["complete 3 abc", "complete 3 -1", "complete 3 0"] {
            assert_eq!(
                command_of(line),
                Some(Command::Complete {
                    task_id: 3,
                    minutes: None
                }),
                "{}",
                line
            );
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("start").is_err());
        assert!(parse_line("start x").is_err());
        assert!(parse_line("").is_err());
        assert!(parse_line("jump").is_err());
        assert!(parse_line("add 15").is_err());
        assert!(parse_line("add soon title").is_err());
    }

    #[test]
    fn test_help_is_rendered_by_clap() {
        let err = parse_line("help").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        let text = err.to_string();
        assert!(text.contains("start"));
        assert!(text.contains("complete"));
    }

    #[test]
    fn test_parse_add_task() {
        assert_eq!(
            parse_line("add 90 --project 2 Write the quarterly report").unwrap(),
            CliAction::Add {
                estimated_minutes: 90,
                project: Some(2),
                title: vec![
                    "Write".to_string(),
                    "the".to_string(),
                    "quarterly".to_string(),
                    "report".to_string()
                ],
            }
        );
        assert_eq!(
            parse_line("add 15 Call Anna").unwrap(),
            CliAction::Add {
                estimated_minutes: 15,
                project: None,
                title: vec!["Call".to_string(), "Anna".to_string()],
            }
        );
        assert_eq!(parse_line("add 15 Call").unwrap().command(), None);
    }

    #[test]
    fn test_parse_other_actions() {
        assert_eq!(parse_line("ls").unwrap(), CliAction::List);
        assert_eq!(parse_line("status").unwrap(), CliAction::Status);
        assert_eq!(parse_line("exit").unwrap(), CliAction::Quit);
        assert_eq!(
            parse_line("project Client X").unwrap(),
            CliAction::Project {
                name: vec!["Client".to_string(), "X".to_string()]
            }
        );
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(120), "2h");
        assert_eq!(format_minutes(150), "2h 30m");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(90), "01:30");
        assert_eq!(format_elapsed(3725), "1:02:05");
    }
}
