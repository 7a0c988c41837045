use std::path::Path;

use git2::{Repository, Signature, StatusOptions};

use crate::error::{Result, SwarmError};

/// Information about the current HEAD: branch name and commit SHA.
pub struct HeadInfo {
    pub branch: Option<String>,
    pub sha: String,
}

/// Retrieve the current HEAD's branch name and commit SHA.
/// Returns None outside a git repository or on an unborn branch.
pub fn current_head_info(repo_root: &Path) -> Option<HeadInfo> {
    let repo = Repository::discover(repo_root).ok()?;
    let head = repo.head().ok()?;
    let branch = if head.is_branch() {
        head.shorthand().map(String::from)
    } else {
        None
    };
    let sha = head.peel_to_commit().ok()?.id().to_string();
    Some(HeadInfo { branch, sha })
}

/// Paths the coordination layer itself writes. Ledger/queue/mail churn never
/// constitutes a commit candidate on its own.
pub fn is_bookkeeping(path: &str) -> bool {
    path.starts_with(".tasks/")
        || path.starts_with(".fmail/")
        || path == ".tasks"
        || path == ".fmail"
}

/// Working-tree changes split into commit candidates and bookkeeping churn.
#[derive(Debug, Default)]
pub struct WorktreeStatus {
    /// Changed paths worth committing (sorted).
    pub changed: Vec<String>,
    /// Changed paths under `.tasks/`/`.fmail/`.
    pub bookkeeping: Vec<String>,
    /// Paths in conflict; committing is refused while any exist.
    pub conflicted: Vec<String>,
    /// Paths deleted from the working tree (subset of `changed`).
    pub deleted: Vec<String>,
}

pub fn worktree_status(repo_root: &Path) -> Result<WorktreeStatus> {
    let repo = Repository::discover(repo_root).map_err(|_| SwarmError::NotGitRepository)?;

    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut opts))?;

    let mut status = WorktreeStatus::default();
    for entry in statuses.iter() {
        let Some(path) = entry.path() else { continue };
        let path = path.replace('\\', "/");
        let flags = entry.status();

        if flags.is_conflicted() {
            status.conflicted.push(path);
            continue;
        }
        if is_bookkeeping(&path) {
            status.bookkeeping.push(path);
            continue;
        }
        if flags.is_wt_deleted() || flags.is_index_deleted() {
            status.deleted.push(path.clone());
        }
        status.changed.push(path);
    }
    status.changed.sort();
    status.changed.dedup();
    status.bookkeeping.sort();
    status.conflicted.sort();
    status.deleted.sort();
    Ok(status)
}

/// Stage the given paths and commit them as `author`. Returns the new SHA.
pub fn commit_paths(
    repo_root: &Path,
    changed: &[String],
    deleted: &[String],
    author: &str,
    message: &str,
) -> Result<String> {
    let repo = Repository::discover(repo_root).map_err(|_| SwarmError::NotGitRepository)?;
    let mut index = repo.index()?;

    for path in changed {
        if deleted.iter().any(|d| d == path) {
            index.remove_path(Path::new(path))?;
        } else {
            index.add_path(Path::new(path))?;
        }
    }
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now(author, &format!("{author}@swarm.invalid"))?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(_) => None,
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    Ok(oid.to_string())
}
