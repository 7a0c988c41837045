use assert_cmd::Command;
use tempfile::tempdir;

use swarm::store::ledger::RunStatus;
use swarm::store::mail::MailStore;
use swarm::store::queue::Queue;
use swarm::store::tasks::TaskStore;

fn sv(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("sv").unwrap();
    cmd.current_dir(dir)
        .env_remove("FMAIL_AGENT")
        .env_remove("FORGE_LOOP_NAME");
    cmd
}

fn envelope(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).unwrap()
}

fn create_task(dir: &std::path::Path, title: &str, args: &[&str]) -> String {
    let mut cmd = sv(dir);
    cmd.args(["task", "create", title, "--agent", "planner"]);
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    envelope(&output)["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn idle_stop_after_three_empty_snapshots() {
    let dir = tempdir().unwrap();
    sv(dir.path())
        .args(["init", "--project", "forge"])
        .assert()
        .success();

    let output = sv(dir.path())
        .args(["work", "--agent", "codex-a", "--poll-interval", "0"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = envelope(&output);
    assert_eq!(value["command"], "work");
    assert_eq!(value["data"]["processed"], 0);
    assert_eq!(value["data"]["stopped"], "idle");

    // Idle status was broadcast and a ledger entry appended.
    let mail = MailStore::open(dir.path());
    let log = mail.log("task", None).unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].body.starts_with("idle: no ready tasks for codex-a"));

    let queue = Queue::open(dir.path()).unwrap();
    let runs = queue.ledger.read("codex-a", None).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Idle);
    assert_eq!(runs[0].exit_code, 0);
}

#[test]
fn successful_run_claims_validates_closes_and_reports() {
    let dir = tempdir().unwrap();
    sv(dir.path())
        .args(["init", "--project", "forge"])
        .assert()
        .success();
    let id = create_task(dir.path(), "green task", &["--validate", "true"]);

    let output = sv(dir.path())
        .args([
            "work",
            "--agent",
            "codex-a",
            "--poll-interval",
            "0",
            "--max-tasks",
            "1",
            "--profile",
            "rust-full",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = envelope(&output);
    assert_eq!(value["data"]["processed"], 1);
    assert_eq!(value["data"]["closed"], 1);
    assert_eq!(value["data"]["stopped"], "max_tasks");

    let queue = Queue::open(dir.path()).unwrap();
    let task = queue.store.resolve(&id).and_then(|id| queue.store.get(&id)).unwrap();
    assert_eq!(task.status.to_string(), "closed");

    // Protocol broadcasts on the task topic, in order.
    let mail = MailStore::open(dir.path());
    let bodies: Vec<String> = mail
        .log("task", None)
        .unwrap()
        .into_iter()
        .map(|m| m.body)
        .collect();
    assert!(bodies[0].starts_with(&format!("claim: {id} by codex-a")));
    assert!(bodies.iter().any(|b| b.contains("progress: command=true exit=0")));
    assert!(bodies.iter().any(|b| b == &format!("{id} closed by codex-a")));

    // Orchestrator got the direct done notice.
    let inbox = mail.inbox("forge-orchestrator", None).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].body, format!("{id}: done"));

    // Ledger entry records the run with its transcript.
    let runs = queue.ledger.read("codex-a", None).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Closed);
    assert_eq!(runs[0].profile.as_deref(), Some("rust-full"));
    assert!(!runs[0].transcript.is_empty());
}

#[test]
fn failing_validation_leaves_task_in_progress_with_blocker() {
    let dir = tempdir().unwrap();
    sv(dir.path())
        .args(["init", "--project", "forge"])
        .assert()
        .success();
    let id = create_task(dir.path(), "red task", &["--validate", "false"]);

    let output = sv(dir.path())
        .args([
            "work",
            "--agent",
            "codex-a",
            "--poll-interval",
            "0",
            "--max-tasks",
            "1",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = envelope(&output);
    assert_eq!(value["data"]["blocked"], 1);

    // Task stays in_progress for the stale auditor to recover later.
    let queue = Queue::open(dir.path()).unwrap();
    let task = queue.store.resolve(&id).and_then(|id| queue.store.get(&id)).unwrap();
    assert_eq!(task.status.to_string(), "in_progress");

    let mail = MailStore::open(dir.path());
    let bodies: Vec<String> = mail
        .log("task", None)
        .unwrap()
        .into_iter()
        .map(|m| m.body)
        .collect();
    assert!(bodies
        .iter()
        .any(|b| b.starts_with(&format!("{id} blocked: command=false"))));

    let runs = queue.ledger.read("codex-a", None).unwrap();
    assert_eq!(runs[0].status, RunStatus::Blocked);
    assert_ne!(runs[0].exit_code, 0);
}

#[test]
fn harness_command_runs_with_task_env() {
    let dir = tempdir().unwrap();
    sv(dir.path())
        .args(["init", "--project", "forge"])
        .assert()
        .success();
    let id = create_task(dir.path(), "env check", &[]);

    sv(dir.path())
        .args([
            "work",
            "--agent",
            "codex-a",
            "--poll-interval",
            "0",
            "--max-tasks",
            "1",
            "--harness",
            "printf %s \"$SV_TASK_ID\" > harness-saw.txt",
        ])
        .assert()
        .success();

    let saw = std::fs::read_to_string(dir.path().join("harness-saw.txt")).unwrap();
    assert_eq!(saw, id);
}

#[test]
fn work_processes_tasks_in_priority_order() {
    let dir = tempdir().unwrap();
    sv(dir.path())
        .args(["init", "--project", "forge"])
        .assert()
        .success();
    let low = create_task(dir.path(), "low", &["--priority", "p3"]);
    let high = create_task(dir.path(), "high", &["--priority", "p0"]);

    sv(dir.path())
        .args([
            "work",
            "--agent",
            "codex-a",
            "--poll-interval",
            "0",
            "--max-tasks",
            "2",
        ])
        .assert()
        .success();

    let mail = MailStore::open(dir.path());
    let claims: Vec<String> = mail
        .log("task", None)
        .unwrap()
        .into_iter()
        .filter(|m| m.body.starts_with("claim: "))
        .map(|m| m.body)
        .collect();
    assert_eq!(claims.len(), 2);
    assert!(claims[0].contains(&high));
    assert!(claims[1].contains(&low));
}
