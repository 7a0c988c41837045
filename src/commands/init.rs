use std::path::Path;

use colored::Colorize;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::tasks::TaskStore;

/// Default project name derived from the repository directory.
fn derive_project(repo_root: &Path) -> String {
    let derived: String = repo_root
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if derived.is_empty() {
        "forge".to_string()
    } else {
        derived
    }
}

pub fn run(repo_root: &Path, project: Option<String>, format: Format) -> Result<()> {
    let project = project.unwrap_or_else(|| derive_project(repo_root));
    let store = TaskStore::init(repo_root, &project)?;

    match format {
        Format::Json => output::print_envelope(
            "init",
            &serde_json::json!({
                "root": store.root().display().to_string(),
                "project": project,
            }),
        )?,
        Format::Pretty => println!(
            "initialized {} for project '{}'",
            store.root().display().to_string().bold(),
            project.cyan()
        ),
        Format::Minimal => println!("init {project}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_project_sanitizes_directory_names() {
        assert_eq!(derive_project(Path::new("/tmp/My Repo")), "my-repo");
        assert_eq!(derive_project(Path::new("/tmp/forge")), "forge");
    }
}
