use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::queue::Queue;

/// Atomically claim a task for an agent.
pub fn start(repo_root: &Path, id_input: String, agent: String, format: Format) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let id = queue.store.resolve(&id_input)?;
    let task = queue.claim(&id, &agent)?;
    output::print_task("task.start", &task, format)
}

/// Close an in-progress task; gated on holder identity and validation.
pub fn close(
    repo_root: &Path,
    id_input: String,
    agent: String,
    force: bool,
    format: Format,
) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let id = queue.store.resolve(&id_input)?;
    let task = queue.close(&id, &agent, force)?;
    output::print_task("task.close", &task, format)
}

/// Hand an in-progress task back to the queue with a blocker reason.
pub fn release(
    repo_root: &Path,
    id_input: String,
    agent: String,
    reason: String,
    force: bool,
    format: Format,
) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let id = queue.store.resolve(&id_input)?;
    let task = queue.release(&id, &agent, &reason, force)?;
    output::print_task("task.release", &task, format)
}
