use std::path::Path;

use chrono::{Duration, Utc};

use crate::agent;
use crate::error::{Result, SwarmError};
use crate::model::{Status, Task, TaskId};
use crate::store::events::{EventKind, EventStore, TaskEvent};
use crate::store::index::Index;
use crate::store::ledger::LedgerStore;
use crate::store::lock::LockGuard;
use crate::store::tasks::TaskStore;

/// Open task store plus derived index, event log, and ledgers.
///
/// All coordination operations (claim, close, release, stale handling) live
/// here so they can hold the claim lock across the task write and the event
/// reads their gates need.
pub struct Queue {
    pub store: TaskStore,
    pub index: Index,
    pub events: EventStore,
    pub ledger: LedgerStore,
}

impl Queue {
    /// Open an existing repository, auto-rebuilding the index if the task
    /// file changed since the index was last written.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let store = TaskStore::open(repo_root)?;
        let index = Index::open(&store.root().join("index.db"))?;

        let current_fp = store.fingerprint()?;
        if index.get_fingerprint()?.as_deref() != Some(current_fp.as_str()) {
            index.rebuild(&store.list_all()?)?;
            index.set_fingerprint(&current_fp)?;
        }

        let events = EventStore::open(store.root());
        let ledger = LedgerStore::open(store.root());

        Ok(Self {
            store,
            index,
            events,
            ledger,
        })
    }

    fn tasks_by_ids(&self, ids: &[String]) -> Result<Vec<Task>> {
        let all = self.store.list_all()?;
        Ok(ids
            .iter()
            .filter_map(|id| all.iter().find(|t| t.id.as_str() == id).cloned())
            .collect())
    }

    /// Ready snapshot: open tasks with all blockers closed, queue-ordered.
    pub fn ready_tasks(&self, project: Option<&str>) -> Result<Vec<Task>> {
        let ids = self.index.ready(project)?;
        self.tasks_by_ids(&ids)
    }

    pub fn list_tasks(&self, project: Option<&str>, status: Option<Status>) -> Result<Vec<Task>> {
        let ids = self.index.list(project, status)?;
        self.tasks_by_ids(&ids)
    }

    /// In-progress tasks untouched for at least `threshold_secs`.
    pub fn stale_tasks(&self, project: Option<&str>, threshold_secs: i64) -> Result<Vec<Task>> {
        let cutoff = Utc::now() - Duration::seconds(threshold_secs);
        let ids = self.index.stale(project, cutoff)?;
        self.tasks_by_ids(&ids)
    }

    /// The agent that last claimed the task, if it is in progress.
    pub fn holder(&self, id: &TaskId) -> Result<Option<String>> {
        let task = self.store.get(id)?;
        if task.status != Status::InProgress {
            return Ok(None);
        }
        let events = self.events.read(id)?;
        Ok(events
            .iter()
            .rev()
            .find(|e| e.event == EventKind::Claim)
            .map(|e| e.author.clone())
            .or(Some(task.updated_by)))
    }

    fn sync_index(&self, task: &Task) -> Result<()> {
        self.index.upsert(task)?;
        self.index.set_fingerprint(&self.store.fingerprint()?)?;
        Ok(())
    }

    /// Create a task and keep the index in sync.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        project: String,
        title: String,
        body: String,
        priority: crate::model::Priority,
        blocked_by: Vec<TaskId>,
        validate: Vec<String>,
        created_by: String,
    ) -> Result<Task> {
        let task = self
            .store
            .create(project, title, body, priority, blocked_by, validate, created_by)?;
        self.sync_index(&task)?;
        Ok(task)
    }

    /// Atomically claim a task: open and unblocked, or a structured error.
    /// The claim lock is held across the read-check-write, so a task has at
    /// most one holder.
    pub fn claim(&self, id: &TaskId, agent_name: &str) -> Result<Task> {
        agent::validate_name(agent_name)?;
        let _claim = LockGuard::acquire(&self.store.claim_lock_path())?;

        let tasks = self.store.list_all()?;
        let task = tasks
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| SwarmError::TaskNotFound(id.to_string()))?;

        match task.status {
            Status::InProgress => {
                let holder = self.holder(id)?.unwrap_or_else(|| task.updated_by.clone());
                return Err(SwarmError::TaskClaimed(id.to_string(), holder));
            }
            Status::Closed => {
                return Err(SwarmError::InvalidTransition(
                    task.status.to_string(),
                    Status::InProgress.to_string(),
                ));
            }
            Status::Open => {}
        }

        let open = TaskStore::open_blockers(&tasks, task);
        if !open.is_empty() {
            let joined = open
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SwarmError::TaskBlocked(id.to_string(), joined));
        }

        let updated = self.store.update(id, agent_name, |t| {
            t.status = Status::InProgress;
        })?;
        self.events
            .append(id, TaskEvent::new(agent_name, EventKind::Claim))?;
        self.sync_index(&updated)?;
        Ok(updated)
    }

    /// Close a task. Only the holder may close (unless `force`), and only
    /// after a passing validation was recorded since the claim.
    pub fn close(&self, id: &TaskId, agent_name: &str, force: bool) -> Result<Task> {
        agent::validate_name(agent_name)?;
        let _claim = LockGuard::acquire(&self.store.claim_lock_path())?;

        let task = self.store.get(id)?;
        if task.status != Status::InProgress {
            return Err(SwarmError::InvalidTransition(
                task.status.to_string(),
                Status::Closed.to_string(),
            ));
        }

        if !force {
            if let Some(holder) = self.holder(id)?
                && holder != agent_name
            {
                return Err(SwarmError::NotHolder(id.to_string(), holder, agent_name.into()));
            }
            // Tasks without validation commands have nothing to gate on.
            if !task.validate.is_empty() && !self.events.validated_since_claim(id)? {
                return Err(SwarmError::ValidationRequired(id.to_string()));
            }
        }

        let updated = self.store.update(id, agent_name, |t| {
            t.status = Status::Closed;
        })?;
        let mut event = TaskEvent::new(agent_name, EventKind::Close);
        if force {
            event = event.with_text("forced");
        }
        self.events.append(id, event)?;
        self.sync_index(&updated)?;
        Ok(updated)
    }

    /// Hand an in-progress task back to the queue with a blocker reason.
    pub fn release(&self, id: &TaskId, agent_name: &str, reason: &str, force: bool) -> Result<Task> {
        agent::validate_name(agent_name)?;
        let _claim = LockGuard::acquire(&self.store.claim_lock_path())?;

        let task = self.store.get(id)?;
        if task.status != Status::InProgress {
            return Err(SwarmError::InvalidTransition(
                task.status.to_string(),
                Status::Open.to_string(),
            ));
        }
        if !force
            && let Some(holder) = self.holder(id)?
            && holder != agent_name
        {
            return Err(SwarmError::NotHolder(id.to_string(), holder, agent_name.into()));
        }

        let updated = self.store.update(id, agent_name, |t| {
            t.status = Status::Open;
        })?;
        self.events.append(
            id,
            TaskEvent::new(agent_name, EventKind::Release).with_text(reason),
        )?;
        self.sync_index(&updated)?;
        Ok(updated)
    }

    /// Append a comment. Comments count as activity: they bump
    /// `updated_at`/`updated_by`, which is what keeps a working holder from
    /// being declared stale.
    pub fn comment(&self, id: &TaskId, agent_name: &str, text: &str) -> Result<TaskEvent> {
        agent::validate_name(agent_name)?;
        let updated = self.store.update(id, agent_name, |_| {})?;
        let event = self
            .events
            .append(id, TaskEvent::new(agent_name, EventKind::Comment).with_text(text))?;
        self.sync_index(&updated)?;
        Ok(event)
    }

    /// Record one validation command result against the task.
    pub fn record_validation(
        &self,
        id: &TaskId,
        agent_name: &str,
        command: &str,
        exit_code: i32,
    ) -> Result<TaskEvent> {
        agent::validate_name(agent_name)?;
        let updated = self.store.update(id, agent_name, |_| {})?;
        let event = self.events.append(
            id,
            TaskEvent::new(agent_name, EventKind::Validation).with_validation(command, exit_code),
        )?;
        self.sync_index(&updated)?;
        Ok(event)
    }

    /// Record a stale-check notice. Deliberately does not touch the task
    /// record: a notice is auditor activity, not holder activity.
    pub fn mark_stale_check(&self, id: &TaskId, auditor: &str, idle_secs: i64) -> Result<TaskEvent> {
        agent::validate_name(auditor)?;
        self.events.append(
            id,
            TaskEvent::new(auditor, EventKind::StaleCheck)
                .with_text(format!("idle {idle_secs}s")),
        )
    }

    /// Return a stale in-progress task to the queue. Re-checks status under
    /// the claim lock so a task the holder just closed is left alone.
    pub fn stale_reopen(&self, id: &TaskId, auditor: &str) -> Result<Task> {
        agent::validate_name(auditor)?;
        let _claim = LockGuard::acquire(&self.store.claim_lock_path())?;

        let task = self.store.get(id)?;
        if task.status != Status::InProgress {
            return Err(SwarmError::InvalidTransition(
                task.status.to_string(),
                Status::Open.to_string(),
            ));
        }

        let updated = self.store.update(id, auditor, |t| {
            t.status = Status::Open;
        })?;
        self.events
            .append(id, TaskEvent::new(auditor, EventKind::StaleReopen))?;
        self.sync_index(&updated)?;
        Ok(updated)
    }
}
