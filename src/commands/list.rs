use std::path::Path;

use crate::error::{Result, SwarmError};
use crate::model::Status;
use crate::output::{self, Format};
use crate::store::queue::Queue;

/// Parse a `--status` filter. `ready` is deliberately rejected with a
/// structured error: readiness is derived, queried via `sv task ready`.
fn parse_status(raw: &str) -> Result<Status> {
    match raw {
        "open" => Ok(Status::Open),
        "in_progress" => Ok(Status::InProgress),
        "closed" => Ok(Status::Closed),
        other => Err(SwarmError::InvalidStatusFilter(other.to_string())),
    }
}

pub fn run(
    repo_root: &Path,
    project: Option<String>,
    status: Option<String>,
    format: Format,
) -> Result<()> {
    let status = status.as_deref().map(parse_status).transpose()?;
    let queue = Queue::open(repo_root)?;
    let tasks = queue.list_tasks(project.as_deref(), status)?;
    output::print_tasks("task.list", &tasks, format)
}
