use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::queue::Queue;

/// Snapshot of claimable tasks: open, all blockers closed, queue-ordered.
pub fn run(repo_root: &Path, project: Option<String>, format: Format) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let tasks = queue.ready_tasks(project.as_deref())?;
    output::print_tasks("task.ready", &tasks, format)
}
