use std::path::Path;

use crate::error::Result;
use crate::model::{Priority, TaskId};
use crate::output::{self, Format};
use crate::store::queue::Queue;

#[allow(clippy::too_many_arguments)]
pub fn run(
    repo_root: &Path,
    title: String,
    project: Option<String>,
    body: Option<String>,
    priority: Priority,
    blocked_by: Vec<String>,
    validate: Vec<String>,
    agent: String,
    format: Format,
) -> Result<()> {
    let queue = Queue::open(repo_root)?;
    let project = match project {
        Some(p) => p,
        None => queue.store.default_project()?,
    };
    let blocked_by: Vec<TaskId> = blocked_by
        .into_iter()
        .map(|raw| queue.store.resolve(&raw))
        .collect::<Result<_>>()?;

    let task = queue.create(
        project,
        title,
        body.unwrap_or_default(),
        priority,
        blocked_by,
        validate,
        agent,
    )?;
    output::print_task("task.create", &task, format)
}
