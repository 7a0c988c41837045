use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};

/// Stored lifecycle state of a task.
///
/// `ready` is intentionally not a stored status: it is derived from
/// `open` plus all `blocked_by` tasks being closed, and queried via
/// `sv task ready`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    /// Sort rank; lower is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Self::P0 => 0,
            Self::P1 => 1,
            Self::P2 => 2,
            Self::P3 => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P0 => write!(f, "p0"),
            Self::P1 => write!(f, "p1"),
            Self::P2 => write!(f, "p2"),
            Self::P3 => write!(f, "p3"),
        }
    }
}

/// Project-scoped task identifier of the form `<project>-<slug>`,
/// e.g. `forge-mzr`. The slug is three lowercase letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub const SLUG_LEN: usize = 3;

    /// Generate a fresh id for a project from an entropy source.
    ///
    /// Collision checking is the caller's job (the store retries).
    pub fn generate(project: &str, entropy: &[u8]) -> Self {
        let slug: String = entropy
            .iter()
            .take(Self::SLUG_LEN)
            .map(|b| (b'a' + (b % 26)) as char)
            .collect();
        Self(format!("{project}-{slug}"))
    }

    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(SwarmError::InvalidTaskId(
                input.to_string(),
                "task id cannot be empty".into(),
            ));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return Err(SwarmError::InvalidTaskId(
                raw.to_string(),
                "expected lowercase alphanumeric/hyphen/underscore".into(),
            ));
        }
        match raw.rsplit_once('-') {
            Some((project, slug)) if !project.is_empty() && !slug.is_empty() => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(SwarmError::InvalidTaskId(
                raw.to_string(),
                "expected `<project>-<slug>`".into(),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project prefix of the id (`forge-mzr` -> `forge`).
    pub fn project(&self) -> &str {
        self.0.rsplit_once('-').map(|(p, _)| p).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub project: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    pub status: Status,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl Task {
    /// Trim the title, drop empty validate commands, then deduplicate and
    /// sort blockers for deterministic storage.
    pub fn normalize(&mut self) {
        let trimmed = self.title.trim();
        if trimmed.len() != self.title.len() {
            self.title = trimmed.to_string();
        }
        self.validate.retain(|c| !c.trim().is_empty());
        self.blocked_by.sort();
        self.blocked_by.dedup();
    }

    /// Seconds since the last update; never negative.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.updated_at).num_seconds().max(0)
    }
}
