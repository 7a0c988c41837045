use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

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

fn setup(dir: &std::path::Path) {
    git2::Repository::init(dir).unwrap();
    sv(dir).args(["init", "--project", "forge"]).assert().success();
}

#[test]
fn bookkeeping_only_changes_are_no_commit_candidate() {
    let dir = tempdir().unwrap();
    setup(dir.path());

    // Only .tasks/ exists in the working tree; the committer must skip it.
    let output = sv(dir.path())
        .args(["commit", "--agent", "committer-loop"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = envelope(&output);
    assert_eq!(value["data"]["committed"], false);
    assert_eq!(value["data"]["reason"], "no commit candidate");
    assert_eq!(value["data"]["bookkeeping_only"], true);
    assert!(swarm::git::current_head_info(dir.path()).is_none());
}

#[test]
fn source_changes_are_committed_with_generated_summary() {
    let dir = tempdir().unwrap();
    setup(dir.path());
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/ported.rs"), "fn main() {}\n").unwrap();
    fs::write(dir.path().join("README.md"), "# port\n").unwrap();

    let output = sv(dir.path())
        .args(["commit", "--agent", "committer-loop"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = envelope(&output);
    assert_eq!(value["data"]["committed"], true);
    assert_eq!(value["data"]["message"], "swarm: 2 files changed");
    let files = value["data"]["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);

    let head = swarm::git::current_head_info(dir.path()).unwrap();
    assert_eq!(head.sha, value["data"]["commit"].as_str().unwrap());

    // Second run: tree is clean apart from bookkeeping.
    let output = sv(dir.path())
        .args(["commit", "--agent", "committer-loop"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(envelope(&output)["data"]["committed"], false);
}

#[test]
fn explicit_message_is_used_verbatim() {
    let dir = tempdir().unwrap();
    setup(dir.path());
    fs::write(dir.path().join("lib.rs"), "// port\n").unwrap();

    let output = sv(dir.path())
        .args([
            "commit",
            "--agent",
            "committer-loop",
            "--message",
            "port: land the mail repository",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = envelope(&output);
    assert_eq!(value["data"]["message"], "port: land the mail repository");

    let repo = git2::Repository::open(dir.path()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message().unwrap(), "port: land the mail repository");
    assert_eq!(head.author().name().unwrap(), "committer-loop");
}
