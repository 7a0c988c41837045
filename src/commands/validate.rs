use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::harness::{self, CommandOutcome};
use crate::output::{self, Format};
use crate::store::queue::Queue;

#[derive(Serialize)]
struct ValidateData {
    task_id: String,
    passed: bool,
    results: Vec<CommandOutcome>,
}

/// Run a task's validation commands and record each result as a
/// validation event. Exits 1 when any command fails, like the gates the
/// agents run directly.
pub fn run(repo_root: &Path, id_input: String, agent: String, format: Format) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let id = queue.store.resolve(&id_input)?;
    let task = queue.store.get(&id)?;

    let mut results = Vec::new();
    let mut all_passed = true;

    for command in &task.validate {
        let outcome = harness::run_shell(
            command,
            repo_root,
            &[("SV_TASK_ID", id.as_str()), ("SV_TASK_TITLE", &task.title)],
        );
        queue.record_validation(&id, &agent, command, outcome.exit_code)?;

        if !outcome.passed {
            all_passed = false;
        }
        match format {
            Format::Json => {}
            Format::Pretty => {
                let icon = if outcome.passed {
                    "PASS".green().bold().to_string()
                } else {
                    "FAIL".red().bold().to_string()
                };
                println!("  [{}] {} {}", icon, "$".dimmed(), command.cyan());
                if !outcome.passed && !outcome.stderr.is_empty() {
                    for line in outcome.stderr.lines().take(10) {
                        println!("         {}", line.red());
                    }
                }
            }
            Format::Minimal => {
                let icon = if outcome.passed { "ok" } else { "FAIL" };
                println!("{icon} {command}");
            }
        }
        results.push(outcome);
    }

    match format {
        Format::Json => output::print_envelope(
            "task.validate",
            &ValidateData {
                task_id: id.to_string(),
                passed: all_passed,
                results,
            },
        )?,
        Format::Pretty => {
            if task.validate.is_empty() {
                println!("no validation commands for task {id}");
            } else if all_passed {
                println!("  {}", "all validation commands passed".green());
            } else {
                println!("  {}", "some validation commands failed".red());
            }
        }
        Format::Minimal => {}
    }

    if !all_passed {
        std::process::exit(1);
    }
    Ok(())
}
