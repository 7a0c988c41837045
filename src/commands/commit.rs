use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::{Result, SwarmError};
use crate::git;
use crate::output::{self, Format};

#[derive(Serialize)]
struct CommitData {
    committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    bookkeeping_only: bool,
    files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// The committer role: sweep up accumulated working-tree changes from the
/// agents sharing this checkout, or report that only queue/mail bookkeeping
/// moved.
pub fn run(
    repo_root: &Path,
    message: Option<String>,
    agent: String,
    format: Format,
) -> Result<()> {
    let status = git::worktree_status(repo_root)?;

    if !status.conflicted.is_empty() {
        return Err(SwarmError::CommitConflict(status.conflicted.join(", ")));
    }

    if status.changed.is_empty() {
        let data = CommitData {
            committed: false,
            commit: None,
            reason: Some("no commit candidate"),
            bookkeeping_only: !status.bookkeeping.is_empty(),
            files: vec![],
            message: None,
        };
        match format {
            Format::Json => output::print_envelope("commit", &data)?,
            Format::Pretty | Format::Minimal => println!("no commit candidate"),
        }
        return Ok(());
    }

    let message = message.unwrap_or_else(|| {
        format!(
            "swarm: {} file{} changed",
            status.changed.len(),
            if status.changed.len() == 1 { "" } else { "s" }
        )
    });
    let sha = git::commit_paths(repo_root, &status.changed, &status.deleted, &agent, &message)?;

    let data = CommitData {
        committed: true,
        commit: Some(sha.clone()),
        reason: None,
        bookkeeping_only: false,
        files: status.changed.clone(),
        message: Some(message.clone()),
    };
    match format {
        Format::Json => output::print_envelope("commit", &data)?,
        Format::Pretty => {
            println!(
                "{} {} ({} file{})",
                "committed".green().bold(),
                sha[..7.min(sha.len())].to_string(),
                status.changed.len(),
                if status.changed.len() == 1 { "" } else { "s" }
            );
            for file in &status.changed {
                println!("  {}", file.dimmed());
            }
        }
        Format::Minimal => println!("commit\t{sha}\t{}", status.changed.len()),
    }
    Ok(())
}
