use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};
use crate::model::TaskId;
use crate::store::lock::LockGuard;

/// What happened to a task. Comments are just one kind of event; the close
/// gate and the stale auditor read the same log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Comment,
    Claim,
    Release,
    Close,
    Validation,
    StaleCheck,
    StaleReopen,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Comment => "comment",
            Self::Claim => "claim",
            Self::Release => "release",
            Self::Close => "close",
            Self::Validation => "validation",
            Self::StaleCheck => "stale_check",
            Self::StaleReopen => "stale_reopen",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub author: String,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl TaskEvent {
    pub fn new(author: &str, event: EventKind) -> Self {
        Self {
            seq: 0,
            at: Utc::now(),
            author: author.to_string(),
            event,
            text: None,
            command: None,
            exit_code: None,
            passed: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_validation(mut self, command: &str, exit_code: i32) -> Self {
        self.command = Some(command.to_string());
        self.exit_code = Some(exit_code);
        self.passed = Some(exit_code == 0);
        self
    }
}

/// Append-only per-task event log under `.tasks/events/<id>.jsonl`.
pub struct EventStore {
    root: PathBuf,
    locks: PathBuf,
}

impl EventStore {
    pub fn open(tasks_root: &Path) -> Self {
        Self {
            root: tasks_root.join("events"),
            locks: tasks_root.join("locks"),
        }
    }

    fn log_path(&self, id: &TaskId) -> PathBuf {
        self.root.join(format!("{id}.jsonl"))
    }

    fn lock_path(&self, id: &TaskId) -> PathBuf {
        self.locks.join(format!("events-{id}.lock"))
    }

    /// Append one event, assigning the next sequence number.
    pub fn append(&self, id: &TaskId, mut event: TaskEvent) -> Result<TaskEvent> {
        fs::create_dir_all(&self.root)?;
        let _lock = LockGuard::acquire(&self.lock_path(id))?;

        event.seq = self.read_locked(id)?.last().map(|e| e.seq + 1).unwrap_or(1);

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(id))?;
        file.write_all(line.as_bytes())?;

        Ok(event)
    }

    pub fn read(&self, id: &TaskId) -> Result<Vec<TaskEvent>> {
        let _lock = LockGuard::acquire(&self.lock_path(id))?;
        self.read_locked(id)
    }

    fn read_locked(&self, id: &TaskId) -> Result<Vec<TaskEvent>> {
        let path = self.log_path(id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = fs::read_to_string(&path)?;
        let mut events = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: TaskEvent = serde_json::from_str(line).map_err(|e| {
                SwarmError::CorruptStore(
                    path.display().to_string(),
                    format!("line {}: {e}", lineno + 1),
                )
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// True when a passing validation was recorded after the latest claim.
    /// This is the gate `sv task close` enforces.
    pub fn validated_since_claim(&self, id: &TaskId) -> Result<bool> {
        let events = self.read(id)?;
        let last_claim_seq = events
            .iter()
            .rev()
            .find(|e| e.event == EventKind::Claim)
            .map(|e| e.seq)
            .unwrap_or(0);
        Ok(events.iter().any(|e| {
            e.event == EventKind::Validation && e.seq > last_claim_seq && e.passed == Some(true)
        }))
    }

    /// The most recent stale-check notice issued after `since`, if any.
    pub fn stale_check_since(
        &self,
        id: &TaskId,
        since: DateTime<Utc>,
    ) -> Result<Option<TaskEvent>> {
        let events = self.read(id)?;
        Ok(events
            .into_iter()
            .rev()
            .find(|e| e.event == EventKind::StaleCheck && e.at > since))
    }
}
