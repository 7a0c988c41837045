use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};
use crate::store::lock::LockGuard;

/// Outcome of one loop run, mirroring the transcript ledgers the swarm
/// emits: closed a task, left it blocked, went idle, or errored out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Closed,
    Blocked,
    Idle,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Blocked => "blocked",
            Self::Idle => "idle",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One appended record per agent loop run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub loop_id: String,
    pub loop_name: String,
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harness: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<String>,
}

/// Per-loop run ledgers under `.tasks/ledger/<loop_name>.jsonl`.
pub struct LedgerStore {
    root: PathBuf,
    locks: PathBuf,
}

impl LedgerStore {
    pub fn open(tasks_root: &Path) -> Self {
        Self {
            root: tasks_root.join("ledger"),
            locks: tasks_root.join("locks"),
        }
    }

    fn ledger_path(&self, loop_name: &str) -> PathBuf {
        self.root.join(format!("{loop_name}.jsonl"))
    }

    fn lock_path(&self) -> PathBuf {
        self.locks.join("ledger.lock")
    }

    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        crate::agent::validate_name(&entry.loop_name)?;
        fs::create_dir_all(&self.root)?;
        let _lock = LockGuard::acquire(&self.lock_path())?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ledger_path(&entry.loop_name))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read a loop's runs, oldest first, optionally limited to the last N.
    pub fn read(&self, loop_name: &str, limit: Option<usize>) -> Result<Vec<LedgerEntry>> {
        crate::agent::validate_name(loop_name)?;
        let path = self.ledger_path(loop_name);
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(line).map_err(|e| {
                SwarmError::CorruptStore(
                    path.display().to_string(),
                    format!("line {}: {e}", lineno + 1),
                )
            })?;
            entries.push(entry);
        }
        if let Some(n) = limit {
            let len = entries.len();
            if len > n {
                entries = entries.split_off(len - n);
            }
        }
        Ok(entries)
    }

    /// Loop names that have ledgers, sorted.
    pub fn loops(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".jsonl") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
