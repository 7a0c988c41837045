use std::fs;

use chrono::{Duration, Utc};
use tempfile::tempdir;

use swarm::commands::audit::{self, AuditOptions};
use swarm::model::{Priority, Status, Task, TaskId};
use swarm::store::queue::Queue;
use swarm::store::tasks::TaskStore;

fn opts(threshold_secs: i64, grace_secs: i64) -> AuditOptions {
    AuditOptions {
        auditor: "stale-auditor".into(),
        project: None,
        threshold_secs,
        grace_secs,
        watch: false,
        interval_secs: 60,
    }
}

fn setup_claimed(dir: &std::path::Path) -> TaskId {
    TaskStore::init(dir, "forge").unwrap();
    let queue = Queue::open(dir).unwrap();
    let task = queue
        .create(
            "forge".into(),
            "abandoned port".into(),
            String::new(),
            Priority::P1,
            vec![],
            vec![],
            "planner".into(),
        )
        .unwrap();
    queue.claim(&task.id, "rust-full-codex-a").unwrap();
    task.id
}

/// Backdate a task's updated_at by editing the store file directly, the way
/// a long-dead holder would leave it.
fn backdate(dir: &std::path::Path, id: &TaskId, secs: i64) {
    let path = dir.join(".tasks").join("tasks.jsonl");
    let content = fs::read_to_string(&path).unwrap();
    let mut out = String::new();
    for line in content.lines() {
        let mut task: Task = serde_json::from_str(line).unwrap();
        if &task.id == id {
            task.updated_at = Utc::now() - Duration::seconds(secs);
        }
        out.push_str(&serde_json::to_string(&task).unwrap());
        out.push('\n');
    }
    fs::write(&path, out).unwrap();
}

#[test]
fn fresh_tasks_are_never_touched() {
    let dir = tempdir().unwrap();
    let _id = setup_claimed(dir.path());

    let report = audit::scan(dir.path(), &opts(2700, 0)).unwrap();
    assert_eq!(report.scanned, 0);
    assert!(report.noticed.is_empty());
    assert!(report.reopened.is_empty());
}

#[test]
fn stale_task_gets_notice_then_reopen() {
    let dir = tempdir().unwrap();
    let id = setup_claimed(dir.path());
    backdate(dir.path(), &id, 3600);

    // First pass: notice only, task untouched.
    let report = audit::scan(dir.path(), &opts(2700, 0)).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.noticed, vec![id.to_string()]);
    assert!(report.reopened.is_empty());

    let queue = Queue::open(dir.path()).unwrap();
    assert_eq!(queue.store.get(&id).unwrap().status, Status::InProgress);

    // Second pass with the grace window elapsed: reopened.
    let report = audit::scan(dir.path(), &opts(2700, 0)).unwrap();
    assert_eq!(report.reopened, vec![id.to_string()]);

    let queue = Queue::open(dir.path()).unwrap();
    let task = queue.store.get(&id).unwrap();
    assert_eq!(task.status, Status::Open);

    // Reclaimable by another agent after the reopen.
    queue.claim(&id, "rust-full-codex-b").unwrap();
}

#[test]
fn grace_window_defers_reopen() {
    let dir = tempdir().unwrap();
    let id = setup_claimed(dir.path());
    backdate(dir.path(), &id, 3600);

    audit::scan(dir.path(), &opts(2700, 300)).unwrap();
    let report = audit::scan(dir.path(), &opts(2700, 300)).unwrap();
    // Notice is pending but young; nothing reopened, nothing re-noticed.
    assert!(report.noticed.is_empty());
    assert!(report.reopened.is_empty());

    let queue = Queue::open(dir.path()).unwrap();
    assert_eq!(queue.store.get(&id).unwrap().status, Status::InProgress);
}

#[test]
fn holder_activity_resets_the_clock() {
    let dir = tempdir().unwrap();
    let id = setup_claimed(dir.path());
    backdate(dir.path(), &id, 3600);

    audit::scan(dir.path(), &opts(2700, 0)).unwrap();

    // The holder comes back and comments; the pending notice is now older
    // than the activity, so the auditor starts over instead of reopening.
    let queue = Queue::open(dir.path()).unwrap();
    queue
        .comment(&id, "rust-full-codex-a", "still on it, tests are long")
        .unwrap();

    let report = audit::scan(dir.path(), &opts(2700, 0)).unwrap();
    assert_eq!(report.scanned, 0);
    assert!(report.reopened.is_empty());

    let queue = Queue::open(dir.path()).unwrap();
    assert_eq!(queue.store.get(&id).unwrap().status, Status::InProgress);
}

#[test]
fn stale_notices_are_broadcast_on_the_task_topic() {
    let dir = tempdir().unwrap();
    let id = setup_claimed(dir.path());
    backdate(dir.path(), &id, 3600);

    audit::scan(dir.path(), &opts(2700, 0)).unwrap();
    audit::scan(dir.path(), &opts(2700, 0)).unwrap();

    let mail = swarm::store::mail::MailStore::open(dir.path());
    let log = mail.log("task", None).unwrap();
    assert!(log
        .iter()
        .any(|m| m.body.starts_with(&format!("stale-check: {id}"))));
    assert!(log
        .iter()
        .any(|m| m.body.starts_with(&format!("stale-reopen: {id}"))));
}
