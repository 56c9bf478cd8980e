//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{Repeat, TaskStatus};

/// TaskWorkers - persisted task scheduling
#[derive(Parser)]
#[command(
    name = "tw",
    about = "Schedule, inspect and settle persisted background tasks",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Directory holding the task database (overrides config)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the identity hash for a handler and its arguments
    Hash {
        handler: String,

        /// Positional arguments as a JSON array
        #[arg(short, long, default_value = "[]", value_parser = parse_json)]
        args: Value,

        /// Keyword arguments as a JSON object
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        kwargs: Value,
    },

    /// Store a new task (no duplicate check)
    Enqueue {
        handler: String,

        /// Positional arguments as a JSON array
        #[arg(short, long, default_value = "[]", value_parser = parse_json)]
        args: Value,

        /// Keyword arguments as a JSON object
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        kwargs: Value,

        /// Seconds from now until the task may run
        #[arg(short, long, default_value = "0")]
        delay: i64,

        /// Repeat period: hourly, daily, weekly, every-2-weeks, every-4-weeks, never, or seconds
        #[arg(short, long, default_value = "never", value_parser = parse_repeat)]
        repeat: i64,
    },

    /// Schedule a one-shot task, unless one is already pending
    Schedule {
        handler: String,

        /// Seconds from now until the task may run
        interval: i64,
    },

    /// Create the next occurrence of a repeating task
    Repeat {
        /// Task ID
        id: String,
    },

    /// List tasks
    List {
        /// Filter by status (waiting, completed, failed)
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Filter by handler name
        #[arg(long)]
        handler: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List waiting tasks whose run time has passed
    Due {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one task
    Show {
        /// Task ID
        id: String,
    },

    /// Mark a task completed (schedules its next occurrence if it repeats)
    Complete {
        /// Task ID
        id: String,
    },

    /// Mark a task failed (schedules its next occurrence if it repeats)
    Fail {
        /// Task ID
        id: String,

        /// Error message to record
        #[arg(short, long)]
        error: String,
    },

    /// Recompute identity hashes for all stored tasks
    Migrate,
}

/// Output format for list commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Parse a JSON command-line value
pub fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {}", e))
}

/// Parse a repeat period given as a name or as seconds
pub fn parse_repeat(s: &str) -> Result<i64, String> {
    debug!(%s, "parse_repeat: called");
    if let Ok(secs) = s.trim().parse::<i64>() {
        return Ok(secs);
    }
    s.parse::<Repeat>().map(|r| r.secs())
}

/// Get the path to the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskworkers")
        .join("logs")
        .join("taskworkers.log")
}
