use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent;
use crate::error::{Result, SwarmError};
use crate::store::lock::LockGuard;

/// A registered agent on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub session_id: String,
    pub registered_at: DateTime<Utc>,
}

/// A durable message on a topic or in an agent inbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub sender: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// The line shape `fmail log` prints: `<id> <sender> -> <topic>: <message>`.
    pub fn log_line(&self) -> String {
        format!("{} {} -> {}: {}", self.id, self.sender, self.topic, self.body)
    }
}

/// Where a message is addressed: a shared topic or one agent's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Topic(String),
    Agent(String),
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.strip_prefix('@') {
            Some(name) => {
                agent::validate_name(name)?;
                Ok(Self::Agent(name.to_string()))
            }
            None => {
                agent::validate_name(raw)
                    .map_err(|_| SwarmError::InvalidTopic(raw.to_string()))?;
                Ok(Self::Topic(raw.to_string()))
            }
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Topic(t) => t.clone(),
            Self::Agent(a) => format!("@{a}"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sequence {
    next: u32,
}

/// The message bus runtime under `.fmail/`.
///
/// Topic logs and agent inboxes are append-only JSONL; the store creates
/// its directories on first use so `fmail send` works without an init step.
pub struct MailStore {
    root: PathBuf,
}

impl MailStore {
    pub fn open(repo_root: &Path) -> Self {
        Self {
            root: repo_root.join(".fmail"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.root.join("registry"))?;
        fs::create_dir_all(self.root.join("topics"))?;
        fs::create_dir_all(self.root.join("agents"))?;
        fs::create_dir_all(self.root.join("locks"))?;
        Ok(())
    }

    fn registration_path(&self, name: &str) -> PathBuf {
        self.root.join("registry").join(format!("{name}.json"))
    }

    fn log_path(&self, target: &Target) -> PathBuf {
        match target {
            Target::Topic(t) => self.root.join("topics").join(format!("{t}.jsonl")),
            Target::Agent(a) => self.root.join("agents").join(format!("{a}.jsonl")),
        }
    }

    fn registry_lock_path(&self) -> PathBuf {
        self.root.join("locks").join("registry.lock")
    }

    fn mail_lock_path(&self) -> PathBuf {
        self.root.join("locks").join("mail.lock")
    }

    fn seq_path(&self) -> PathBuf {
        self.root.join("seq.json")
    }

    /// Register an agent, generating a display name when none is given.
    pub fn register(&self, name: Option<&str>, session_id: Option<&str>) -> Result<Registration> {
        if let Some(name) = name {
            agent::validate_name(name)?;
        }
        self.ensure_dirs()?;
        let _lock = LockGuard::acquire(&self.registry_lock_path())?;

        let resolved = match name {
            Some(name) => {
                if self.registration_path(name).exists() {
                    return Err(SwarmError::NameTaken(name.to_string()));
                }
                name.to_string()
            }
            None => {
                let mut generated = agent::generated_name();
                while self.registration_path(&generated).exists() {
                    generated = agent::generated_name_suffixed();
                }
                generated
            }
        };

        let reg = Registration {
            name: resolved.clone(),
            session_id: session_id
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            registered_at: Utc::now(),
        };
        fs::write(
            self.registration_path(&resolved),
            serde_json::to_string_pretty(&reg)?,
        )?;
        Ok(reg)
    }

    pub fn registrations(&self) -> Result<Vec<Registration>> {
        let dir = self.root.join("registry");
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut regs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let reg: Registration = serde_json::from_str(&content).map_err(|e| {
                SwarmError::CorruptStore(path.display().to_string(), e.to_string())
            })?;
            regs.push(reg);
        }
        regs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(regs)
    }

    /// Next message id, `YYYYMMDD-HHMMSS-NNNN`. The sequence counter is
    /// persisted under lock so concurrent senders within one second still
    /// get distinct ids.
    fn next_id(&self, now: DateTime<Utc>) -> Result<String> {
        let path = self.seq_path();
        let mut seq = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                SwarmError::CorruptStore(path.display().to_string(), e.to_string())
            })?
        } else {
            Sequence { next: 0 }
        };
        let n = seq.next;
        seq.next = (seq.next + 1) % 10_000;
        fs::write(&path, serde_json::to_string(&seq)?)?;
        Ok(format!("{}-{:04}", now.format("%Y%m%d-%H%M%S"), n))
    }

    /// Append a message to a topic log or agent inbox.
    pub fn send(&self, sender: &str, target: &Target, body: &str) -> Result<Message> {
        agent::validate_name(sender)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(SwarmError::EmptyMessage);
        }
        self.ensure_dirs()?;

        let _lock = LockGuard::acquire(&self.mail_lock_path())?;
        let now = Utc::now();
        let msg = Message {
            id: self.next_id(now)?,
            topic: target.display(),
            sender: sender.to_string(),
            body: body.to_string(),
            sent_at: now,
        };

        let mut line = serde_json::to_string(&msg)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(target))?;
        file.write_all(line.as_bytes())?;

        Ok(msg)
    }

    /// Read a topic's messages, oldest first, limited to the last N.
    pub fn log(&self, topic: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        self.read_log(&Target::parse(topic)?, limit)
    }

    /// Read an agent's direct messages.
    pub fn inbox(&self, name: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        agent::validate_name(name)?;
        self.read_log(&Target::Agent(name.to_string()), limit)
    }

    fn read_log(&self, target: &Target, limit: Option<usize>) -> Result<Vec<Message>> {
        let path = self.log_path(target);
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = fs::read_to_string(&path)?;
        let mut messages = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let msg: Message = serde_json::from_str(line).map_err(|e| {
                SwarmError::CorruptStore(
                    path.display().to_string(),
                    format!("line {}: {e}", lineno + 1),
                )
            })?;
            messages.push(msg);
        }
        if let Some(n) = limit {
            let len = messages.len();
            if len > n {
                messages = messages.split_off(len - n);
            }
        }
        Ok(messages)
    }

    /// Topic names with message counts, sorted by name.
    pub fn topics(&self) -> Result<Vec<(String, usize)>> {
        let dir = self.root.join("topics");
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut topics = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".jsonl") {
                let count = self
                    .read_log(&Target::Topic(stem.to_string()), None)?
                    .len();
                topics.push((stem.to_string(), count));
            }
        }
        topics.sort();
        Ok(topics)
    }
}

/// Walk up from the current directory for an existing `.fmail/` (or the
/// `.tasks/` root it usually sits next to); fall back to the current
/// directory so `fmail` works without an init step.
pub fn find_mail_root() -> std::path::PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    for marker in [".fmail", ".tasks"] {
        let mut dir = cwd.clone();
        loop {
            if dir.join(marker).exists() {
                return dir;
            }
            if !dir.pop() {
                break;
            }
        }
    }
    cwd
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, MailStore) {
        let dir = tempdir().unwrap();
        let store = MailStore::open(dir.path());
        (dir, store)
    }

    #[test]
    fn send_and_log_round_trip() {
        let (_dir, store) = setup();
        let target = Target::parse("task").unwrap();
        store
            .send("rust-full-codex-a", &target, "claim: forge-mzr by rust-full-codex-a")
            .unwrap();
        store
            .send("rust-full-codex-b", &target, "forge-abc progress: tests passing")
            .unwrap();

        let messages = store.log("task", None).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "rust-full-codex-a");
        assert!(messages[0].log_line().contains("-> task: claim: forge-mzr"));
    }

    #[test]
    fn log_limit_keeps_latest() {
        let (_dir, store) = setup();
        let target = Target::parse("task").unwrap();
        for i in 0..5 {
            store.send("a", &target, &format!("msg {i}")).unwrap();
        }
        let messages = store.log("task", Some(2)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "msg 3");
        assert_eq!(messages[1].body, "msg 4");
    }

    #[test]
    fn message_ids_are_unique_and_well_formed() {
        let (_dir, store) = setup();
        let target = Target::parse("task").unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in 0..10 {
            let msg = store.send("a", &target, &format!("m{i}")).unwrap();
            // YYYYMMDD-HHMMSS-NNNN
            assert_eq!(msg.id.len(), 8 + 1 + 6 + 1 + 4);
            assert!(seen.insert(msg.id));
        }
    }

    #[test]
    fn direct_messages_land_in_agent_inbox() {
        let (_dir, store) = setup();
        let target = Target::parse("@forge-orchestrator").unwrap();
        store.send("codex-a", &target, "forge-mzr: done").unwrap();

        let inbox = store.inbox("forge-orchestrator", None).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].topic, "@forge-orchestrator");
        assert!(store.log("task", None).unwrap().is_empty());
    }

    #[test]
    fn register_generates_display_name() {
        let (_dir, store) = setup();
        let reg = store.register(None, None).unwrap();
        assert!(reg.name.contains('-'));
        assert!(store.registration_path(&reg.name).exists());
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let (_dir, store) = setup();
        store.register(Some("codex-a"), None).unwrap();
        assert!(matches!(
            store.register(Some("codex-a"), None).unwrap_err(),
            SwarmError::NameTaken(_)
        ));
    }

    #[test]
    fn empty_body_rejected() {
        let (_dir, store) = setup();
        let target = Target::parse("task").unwrap();
        assert!(matches!(
            store.send("a", &target, "   ").unwrap_err(),
            SwarmError::EmptyMessage
        ));
    }

    #[test]
    fn topics_reports_counts() {
        let (_dir, store) = setup();
        store
            .send("a", &Target::parse("task").unwrap(), "one")
            .unwrap();
        store
            .send("a", &Target::parse("task").unwrap(), "two")
            .unwrap();
        store
            .send("a", &Target::parse("status").unwrap(), "idle")
            .unwrap();

        let topics = store.topics().unwrap();
        assert_eq!(topics, vec![("status".into(), 1), ("task".into(), 2)]);
    }

    #[test]
    fn target_parse_distinguishes_agent_and_topic() {
        assert_eq!(
            Target::parse("@codex-a").unwrap(),
            Target::Agent("codex-a".into())
        );
        assert_eq!(Target::parse("task").unwrap(), Target::Topic("task".into()));
        assert!(Target::parse("bad topic").is_err());
    }
}
