use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::model::Task;
use crate::output::{self, Format};
use crate::store::events::TaskEvent;
use crate::store::queue::Queue;

#[derive(Serialize)]
struct ShowData<'a> {
    task: &'a Task,
    events: &'a [TaskEvent],
}

pub fn run(repo_root: &Path, id_input: String, format: Format) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let id = queue.store.resolve(&id_input)?;
    let task = queue.store.get(&id)?;
    let events = queue.events.read(&id)?;

    match format {
        Format::Json => output::print_envelope(
            "task.show",
            &ShowData {
                task: &task,
                events: &events,
            },
        )?,
        Format::Pretty => {
            output::print_task("task.show", &task, Format::Pretty)?;
            if !events.is_empty() {
                println!("  {}", "history:".dimmed());
                for event in &events {
                    let detail = event
                        .text
                        .as_deref()
                        .or(event.command.as_deref())
                        .unwrap_or("");
                    println!(
                        "    {} {} {} {}",
                        event.at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                        event.event,
                        event.author.cyan(),
                        detail
                    );
                }
            }
        }
        Format::Minimal => output::print_task("task.show", &task, Format::Minimal)?,
    }
    Ok(())
}
