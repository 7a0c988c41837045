use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::events::TaskEvent;
use crate::store::queue::Queue;

#[derive(Serialize)]
struct CommentData<'a> {
    task_id: String,
    event: &'a TaskEvent,
}

pub fn run(
    repo_root: &Path,
    id_input: String,
    text: String,
    agent: String,
    format: Format,
) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let id = queue.store.resolve(&id_input)?;
    let event = queue.comment(&id, &agent, &text)?;

    match format {
        Format::Json => output::print_envelope(
            "task.comment",
            &CommentData {
                task_id: id.to_string(),
                event: &event,
            },
        )?,
        Format::Pretty => println!(
            "{} {} {} {}",
            "comment".cyan().bold(),
            id,
            format!("#{}", event.seq).dimmed(),
            event.text.as_deref().unwrap_or("")
        ),
        Format::Minimal => println!("comment\t{}\t{}", id, event.seq),
    }
    Ok(())
}
