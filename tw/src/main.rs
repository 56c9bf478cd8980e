//! TaskWorkers CLI
//!
//! Inspect and manipulate the task database: schedule, list, settle and
//! migrate tasks.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use taskworkers::cli::{Cli, Command, OutputFormat, get_log_path};
use taskworkers::config::Config;
use taskworkers::{
    MS_PER_SEC, Repository, ScheduleResult, Scheduler, StoreRepository, Task, TaskQuery, TaskStatus, identity_hash_values,
    now_ms, rehash_tasks,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        None => tracing::Level::INFO,
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    config.validate()?;

    // `hash` needs no storage
    if let Command::Hash { handler, args, kwargs } = &cli.command {
        let hash = identity_hash_values(handler, args, kwargs)?;
        println!("{}", hash);
        return Ok(());
    }

    let store_path = cli.store.clone().unwrap_or_else(|| config.storage.path.clone());
    let repo: Arc<dyn Repository> = Arc::new(
        StoreRepository::open_with(&store_path, config.storage.store_options())
            .context(format!("Failed to open task store at {}", store_path.display()))?,
    );
    info!(path = %store_path.display(), "Opened task store");
    let scheduler = Scheduler::new(repo.clone());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Hash { .. } => Ok(()),
        Command::Enqueue {
            handler,
            args,
            kwargs,
            delay,
            repeat,
        } => cmd_enqueue(&scheduler, handler, args, kwargs, delay, repeat),
        Command::Schedule { handler, interval } => {
            print_schedule_result(&scheduler.create_scheduled_task(&handler, interval)?);
            Ok(())
        }
        Command::Repeat { id } => {
            let task = load_task(repo.as_ref(), &id)?;
            print_schedule_result(&scheduler.create_repeated(&task)?);
            Ok(())
        }
        Command::List { status, handler, format } => {
            let mut query = TaskQuery::new();
            if let Some(status) = status {
                query = query.status(status);
            }
            if let Some(handler) = handler {
                query = query.handler(handler);
            }
            print_tasks(&repo.list(&query)?, &format)
        }
        Command::Due { format } => print_tasks(&scheduler.due(now_ms())?, &format),
        Command::Show { id } => {
            let task = load_task(repo.as_ref(), &id)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(())
        }
        Command::Complete { id } => cmd_settle(&scheduler, repo.as_ref(), &id, Ok(())),
        Command::Fail { id, error } => cmd_settle(&scheduler, repo.as_ref(), &id, Err(error)),
        Command::Migrate => {
            let changed = rehash_tasks(repo.as_ref())?;
            println!("{} Rehashed {} task(s)", "✓".green(), changed);
            Ok(())
        }
    }
}

fn cmd_enqueue(
    scheduler: &Scheduler,
    handler: String,
    args: serde_json::Value,
    kwargs: serde_json::Value,
    delay: i64,
    repeat: i64,
) -> Result<()> {
    let run_at = delay
        .checked_mul(MS_PER_SEC)
        .and_then(|d| now_ms().checked_add(d))
        .ok_or_else(|| eyre!("delay {}s is out of range", delay))?;
    let task = Task::new(handler, args, kwargs)?
        .with_run_at(run_at)
        .with_repeat(repeat);
    let stored = scheduler.enqueue(task)?;
    println!("{} Enqueued {} {}", "✓".green(), stored.summary(), stored.id.cyan());
    Ok(())
}

fn cmd_settle(scheduler: &Scheduler, repo: &dyn Repository, id: &str, outcome: Result<(), String>) -> Result<()> {
    let mut task = load_task(repo, id)?;
    let result = scheduler.settle(&mut task, outcome, now_ms())?;
    println!("{} {} is now {}", "✓".green(), task.id.cyan(), status_colored(task.status));
    print_schedule_result(&result);
    Ok(())
}

fn load_task(repo: &dyn Repository, id: &str) -> Result<Task> {
    repo.get(id)?.ok_or_else(|| eyre!("Task not found: {}", id))
}

fn print_schedule_result(result: &ScheduleResult) {
    match result {
        ScheduleResult::Scheduled(task) => {
            println!(
                "{} Scheduled {} {} at {}",
                "✓".green(),
                task.summary(),
                task.id.cyan(),
                format_time(task.run_at)
            );
        }
        ScheduleResult::Duplicate { reason } => {
            println!("{} Not scheduled: {}", "⚠".yellow(), reason);
        }
        ScheduleResult::NotRepeating => {}
    }
}

fn print_tasks(tasks: &[Task], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(tasks)?);
        }
        OutputFormat::Text => {
            if tasks.is_empty() {
                println!("No tasks found");
                return Ok(());
            }
            for task in tasks {
                let repeat = task
                    .repeat()
                    .map(|r| r.label().to_string())
                    .unwrap_or_else(|| format!("every {}s", task.repeat_interval));
                println!(
                    "{}  {:<9}  {:<24}  {}  {}  {}",
                    task.id.cyan(),
                    status_colored(task.status),
                    task.handler,
                    task.short_hash().dimmed(),
                    format_time(task.run_at),
                    repeat.dimmed()
                );
                if !task.error.is_empty() {
                    println!("    {}", task.error.red());
                }
            }
        }
    }
    Ok(())
}

fn status_colored(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Waiting => status.as_str().yellow(),
        TaskStatus::Completed => status.as_str().green(),
        TaskStatus::Failed => status.as_str().red(),
    }
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}
