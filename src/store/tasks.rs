use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};
use crate::model::{Priority, Status, Task, TaskId};
use crate::store::lock::LockGuard;

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    version: u32,
    project: String,
}

/// Root of the `.tasks/` directory for a repository.
///
/// Tasks live in a single JSONL file (`tasks.jsonl`, one record per line);
/// every mutation rewrites the file under an exclusive lock.
#[derive(Debug)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    /// Open an existing `.tasks` directory.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let root = repo_root.join(".tasks");
        if !root.join("config.json").exists() {
            return Err(SwarmError::NotInitialized);
        }
        Ok(Self { root })
    }

    /// Initialize a new `.tasks` directory.
    pub fn init(repo_root: &Path, project: &str) -> Result<Self> {
        let root = repo_root.join(".tasks");
        if root.join("config.json").exists() {
            return Err(SwarmError::AlreadyInitialized);
        }
        crate::agent::validate_name(project)?;

        fs::create_dir_all(root.join("events"))?;
        fs::create_dir_all(root.join("ledger"))?;
        fs::create_dir_all(root.join("locks"))?;
        fs::write(root.join("tasks.jsonl"), "")?;
        let config = Config {
            version: 1,
            project: project.to_string(),
        };
        fs::write(root.join("config.json"), serde_json::to_string_pretty(&config)?)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default project recorded at init time.
    pub fn default_project(&self) -> Result<String> {
        let path = self.root.join("config.json");
        let data = fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| SwarmError::CorruptStore(path.display().to_string(), e.to_string()))?;
        Ok(config.project)
    }

    fn tasks_path(&self) -> PathBuf {
        self.root.join("tasks.jsonl")
    }

    fn store_lock_path(&self) -> PathBuf {
        self.root.join("locks").join("tasks.lock")
    }

    /// Lock file guarding the whole claim/close/release critical section.
    /// Held by the command layer across the event-log reads those gates need.
    pub fn claim_lock_path(&self) -> PathBuf {
        self.root.join("locks").join("claim.lock")
    }

    fn read_tasks_locked(&self) -> Result<Vec<Task>> {
        let path = self.tasks_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = fs::read_to_string(&path)?;
        let mut tasks = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let task: Task = serde_json::from_str(line).map_err(|e| {
                SwarmError::CorruptStore(
                    path.display().to_string(),
                    format!("line {}: {e}", lineno + 1),
                )
            })?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    fn write_tasks_locked(&self, tasks: &[Task]) -> Result<()> {
        let mut out = String::new();
        for task in tasks {
            out.push_str(&serde_json::to_string(task)?);
            out.push('\n');
        }
        fs::write(self.tasks_path(), out)?;
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<Task>> {
        let _lock = LockGuard::acquire(&self.store_lock_path())?;
        self.read_tasks_locked()
    }

    pub fn get(&self, id: &TaskId) -> Result<Task> {
        self.list_all()?
            .into_iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| SwarmError::TaskNotFound(id.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        project: String,
        title: String,
        body: String,
        priority: Priority,
        blocked_by: Vec<TaskId>,
        validate: Vec<String>,
        created_by: String,
    ) -> Result<Task> {
        crate::agent::validate_name(&project)?;
        let _lock = LockGuard::acquire(&self.store_lock_path())?;
        let mut tasks = self.read_tasks_locked()?;

        for dep in &blocked_by {
            if !tasks.iter().any(|t| &t.id == dep) {
                return Err(SwarmError::TaskNotFound(dep.to_string()));
            }
        }

        let id = self.fresh_id(&project, &tasks)?;
        let now = Utc::now();
        let mut task = Task {
            id,
            project,
            title,
            body,
            status: Status::Open,
            priority,
            blocked_by,
            validate,
            created_at: now,
            updated_at: now,
            created_by: created_by.clone(),
            updated_by: created_by,
        };
        task.normalize();

        tasks.push(task.clone());
        self.write_tasks_locked(&tasks)?;
        Ok(task)
    }

    fn fresh_id(&self, project: &str, tasks: &[Task]) -> Result<TaskId> {
        for _ in 0..128 {
            let entropy = *uuid::Uuid::new_v4().as_bytes();
            let candidate = TaskId::generate(project, &entropy);
            if !tasks.iter().any(|t| t.id == candidate) {
                return Ok(candidate);
            }
        }
        Err(SwarmError::CorruptStore(
            self.tasks_path().display().to_string(),
            format!("task id space exhausted for project '{project}'"),
        ))
    }

    /// Apply a mutation to one task under the store lock. The closure sees
    /// the task after a fresh read; `updated_at`/`updated_by` are bumped on
    /// every call (an update is activity by definition).
    pub fn update<F>(&self, id: &TaskId, updated_by: &str, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let _lock = LockGuard::acquire(&self.store_lock_path())?;
        let mut tasks = self.read_tasks_locked()?;
        let task = tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| SwarmError::TaskNotFound(id.to_string()))?;

        f(task);
        task.updated_at = Utc::now();
        task.updated_by = updated_by.to_string();
        task.normalize();
        let updated = task.clone();

        self.write_tasks_locked(&tasks)?;
        Ok(updated)
    }

    /// Ids of open blockers that keep `task` from being ready.
    pub fn open_blockers(tasks: &[Task], task: &Task) -> Vec<TaskId> {
        task.blocked_by
            .iter()
            .filter(|dep| {
                tasks
                    .iter()
                    .find(|t| &&t.id == dep)
                    .is_none_or(|t| t.status != Status::Closed)
            })
            .cloned()
            .collect()
    }

    /// Resolve a user-supplied id: exact match first, then unique prefix.
    pub fn resolve(&self, input: &str) -> Result<TaskId> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(SwarmError::InvalidTaskId(
                input.to_string(),
                "task id cannot be empty".into(),
            ));
        }
        let tasks = self.list_all()?;

        if let Ok(exact) = TaskId::parse(raw)
            && tasks.iter().any(|t| t.id == exact)
        {
            return Ok(exact);
        }

        let mut matches: Vec<TaskId> = tasks
            .iter()
            .filter(|t| t.id.as_str().starts_with(raw))
            .map(|t| t.id.clone())
            .collect();
        matches.sort();
        matches.dedup();

        match matches.len() {
            0 => Err(SwarmError::TaskNotFound(raw.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(SwarmError::TaskIdAmbiguous(
                raw.to_string(),
                matches
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Fingerprint of the task file (size + nanosecond mtime). Cheap stat
    /// call used to detect whether the derived index must be rebuilt.
    pub fn fingerprint(&self) -> Result<String> {
        let path = self.tasks_path();
        if !path.exists() {
            return Ok("empty".into());
        }
        let meta = fs::metadata(&path)?;
        let mtime = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Ok(format!("{}:{}", meta.len(), mtime))
    }
}

/// Walk up from the current directory to find the `.tasks` root.
pub fn find_repo_root() -> Result<PathBuf> {
    let mut dir = std::env::current_dir().map_err(SwarmError::Io)?;
    loop {
        if dir.join(".tasks").exists() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(SwarmError::NotInitialized);
        }
    }
}

/// True when the task would appear in a `ready` snapshot.
pub fn is_ready(tasks: &[Task], task: &Task) -> bool {
    task.status == Status::Open && TaskStore::open_blockers(tasks, task).is_empty()
}

/// Derived staleness: in_progress and untouched for at least `threshold_secs`.
pub fn is_stale(task: &Task, now: DateTime<Utc>, threshold_secs: i64) -> bool {
    task.status == Status::InProgress && task.idle_secs(now) >= threshold_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_basic(store: &TaskStore, title: &str) -> Task {
        store
            .create(
                "forge".into(),
                title.into(),
                String::new(),
                Priority::P2,
                vec![],
                vec![],
                "planner".into(),
            )
            .unwrap()
    }

    #[test]
    fn init_creates_directory_structure() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        assert!(store.root().join("config.json").exists());
        assert!(store.root().join("tasks.jsonl").exists());
        assert!(store.root().join("events").is_dir());
        assert!(store.root().join("ledger").is_dir());
        assert_eq!(store.default_project().unwrap(), "forge");
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempdir().unwrap();
        TaskStore::init(dir.path(), "forge").unwrap();
        assert!(matches!(
            TaskStore::init(dir.path(), "forge").unwrap_err(),
            SwarmError::AlreadyInitialized
        ));
    }

    #[test]
    fn create_and_get_task() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let task = create_basic(&store, "Port mail repository");
        assert!(task.id.as_str().starts_with("forge-"));
        let read = store.get(&task.id).unwrap();
        assert_eq!(read.title, "Port mail repository");
        assert_eq!(read.status, Status::Open);
    }

    #[test]
    fn create_rejects_unknown_blockers() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let missing = TaskId::parse("forge-zzz").unwrap();
        let err = store
            .create(
                "forge".into(),
                "blocked".into(),
                String::new(),
                Priority::P2,
                vec![missing],
                vec![],
                "planner".into(),
            )
            .unwrap_err();
        assert!(matches!(err, SwarmError::TaskNotFound(_)));
    }

    #[test]
    fn generated_ids_are_unique() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in 0..20 {
            let task = create_basic(&store, &format!("task-{i}"));
            assert!(seen.insert(task.id));
        }
    }

    #[test]
    fn update_bumps_updated_at_and_by() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let task = create_basic(&store, "one");

        let updated = store
            .update(&task.id, "rust-full-codex-a", |t| {
                t.status = Status::InProgress;
            })
            .unwrap();
        assert_eq!(updated.status, Status::InProgress);
        assert_eq!(updated.updated_by, "rust-full-codex-a");
        assert!(updated.updated_at >= task.updated_at);
    }

    #[test]
    fn ready_is_derived_from_blockers() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let dep = create_basic(&store, "dep");
        let blocked = store
            .create(
                "forge".into(),
                "blocked".into(),
                String::new(),
                Priority::P1,
                vec![dep.id.clone()],
                vec![],
                "planner".into(),
            )
            .unwrap();

        let tasks = store.list_all().unwrap();
        let blocked_read = tasks.iter().find(|t| t.id == blocked.id).unwrap();
        assert!(!is_ready(&tasks, blocked_read));

        store
            .update(&dep.id, "agent", |t| t.status = Status::Closed)
            .unwrap();
        let tasks = store.list_all().unwrap();
        let blocked_read = tasks.iter().find(|t| t.id == blocked.id).unwrap();
        assert!(is_ready(&tasks, blocked_read));
    }

    #[test]
    fn resolve_exact_and_prefix() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let task = create_basic(&store, "one");

        assert_eq!(store.resolve(task.id.as_str()).unwrap(), task.id);
        // Unique prefix: the full id minus the last character
        let prefix = &task.id.as_str()[..task.id.as_str().len() - 1];
        let resolved = store.resolve(prefix);
        // Either unique (resolves) or ambiguous if another id shares it
        if let Ok(resolved) = resolved {
            assert_eq!(resolved, task.id);
        }
        assert!(matches!(
            store.resolve("nope-xyz").unwrap_err(),
            SwarmError::TaskNotFound(_)
        ));
    }

    #[test]
    fn staleness_threshold() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let task = create_basic(&store, "one");
        let mut task = store
            .update(&task.id, "agent", |t| t.status = Status::InProgress)
            .unwrap();

        let now = task.updated_at + chrono::Duration::seconds(2699);
        assert!(!is_stale(&task, now, 2700));
        let now = task.updated_at + chrono::Duration::seconds(2700);
        assert!(is_stale(&task, now, 2700));

        task.status = Status::Closed;
        assert!(!is_stale(&task, now, 2700));
    }

    #[test]
    fn fingerprint_changes_on_write() {
        let dir = tempdir().unwrap();
        let store = TaskStore::init(dir.path(), "forge").unwrap();
        let before = store.fingerprint().unwrap();
        create_basic(&store, "one");
        let after = store.fingerprint().unwrap();
        assert_ne!(before, after);
    }
}
