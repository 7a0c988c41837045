use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::model::{Status, Task};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

/// Wrap a command payload in the success envelope:
/// `{"schema_version":1,"command":"task.ready","status":"ok","data":{...}}`.
pub fn envelope(command: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "command": command,
        "status": "ok",
        "data": data,
    })
}

pub fn print_envelope<T: Serialize>(command: &str, data: &T) -> Result<()> {
    let payload = serde_json::to_value(data)?;
    println!("{}", serde_json::to_string(&envelope(command, payload))?);
    Ok(())
}

fn status_colored(status: Status) -> String {
    match status {
        Status::Open => status.to_string().yellow().to_string(),
        Status::InProgress => status.to_string().cyan().to_string(),
        Status::Closed => status.to_string().green().to_string(),
    }
}

pub fn print_task(command: &str, task: &Task, format: Format) -> Result<()> {
    match format {
        Format::Json => print_envelope(command, task)?,
        Format::Pretty => {
            println!(
                "[{}] {} ({})",
                task.id.to_string().bold(),
                task.title,
                status_colored(task.status)
            );
            if !task.body.is_empty() {
                println!("  {}", task.body);
            }
            println!(
                "  {} {} | {} {} | {} {}",
                "project:".dimmed(),
                task.project,
                "priority:".dimmed(),
                task.priority,
                "status:".dimmed(),
                task.status
            );
            if !task.blocked_by.is_empty() {
                let deps: Vec<&str> = task.blocked_by.iter().map(|d| d.as_str()).collect();
                println!("  {} {}", "blocked by:".dimmed(), deps.join(", "));
            }
            if !task.validate.is_empty() {
                println!("  {} {}", "validate:".dimmed(), task.validate.join(" && "));
            }
            println!(
                "  {} {} @ {}",
                "updated by:".dimmed(),
                task.updated_by,
                task.updated_at.to_rfc3339()
            );
        }
        Format::Minimal => {
            let title = truncate_title(&task.title, 32);
            println!(
                "{:16} {:32} {:2} {:11} {}",
                task.id, title, task.priority, task.status, task.updated_by
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct TaskListData<'a> {
    total: usize,
    tasks: &'a [Task],
}

pub fn print_tasks(command: &str, tasks: &[Task], format: Format) -> Result<()> {
    match format {
        Format::Json => print_envelope(
            command,
            &TaskListData {
                total: tasks.len(),
                tasks,
            },
        )?,
        Format::Pretty => {
            if tasks.is_empty() {
                println!("{}", "no tasks".dimmed());
            }
            for task in tasks {
                print_task(command, task, Format::Pretty)?;
                println!();
            }
        }
        Format::Minimal => {
            println!(
                "{:16} {:32} {:2} {:11} UPDATED_BY",
                "ID", "TITLE", "PR", "STATUS"
            );
            println!("{}", "-".repeat(72));
            for task in tasks {
                print_task(command, task, Format::Minimal)?;
            }
        }
    }
    Ok(())
}

pub fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() > max_len {
        let truncated: String = title.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_observed_shape() {
        let value = envelope("task.ready", serde_json::json!({"total": 0, "tasks": []}));
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["command"], "task.ready");
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["total"], 0);
    }

    #[test]
    fn truncate_leaves_short_titles_alone() {
        assert_eq!(truncate_title("short", 12), "short");
        assert_eq!(truncate_title("a very long title indeed", 12), "a very lo...");
    }
}
