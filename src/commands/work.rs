use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::error::{Result, SwarmError};
use crate::harness;
use crate::model::Task;
use crate::output::{self, Format};
use crate::store::ledger::{LedgerEntry, RunStatus};
use crate::store::mail::{MailStore, Target};
use crate::store::queue::Queue;

/// Consecutive empty ready snapshots before the loop posts an idle status
/// and stops, rather than busy-polling the queue forever.
const IDLE_POLL_LIMIT: u32 = 3;

/// Shared topic for claim/progress/blocked/closed broadcasts.
const TASK_TOPIC: &str = "task";

pub struct WorkOptions {
    pub agent: String,
    pub project: Option<String>,
    pub profile: Option<String>,
    pub harness: Option<String>,
    /// Agent notified directly when a task closes.
    pub notify: String,
    pub max_tasks: Option<u32>,
    pub poll_interval_secs: u64,
}

#[derive(Serialize)]
struct WorkSummary {
    agent: String,
    loop_id: String,
    processed: u32,
    closed: u32,
    blocked: u32,
    stopped: &'static str,
}

struct RunRecord {
    status: RunStatus,
    exit_code: i32,
    started_at: chrono::DateTime<Utc>,
    transcript: Vec<String>,
}

/// The poll / claim / execute / report loop one agent process runs.
pub fn run(repo_root: &Path, opts: WorkOptions, format: Format) -> Result<()> {
    crate::agent::validate_name(&opts.agent)?;
    let mail = MailStore::open(repo_root);
    let loop_id = uuid::Uuid::new_v4().to_string();

    let mut idle_streak = 0u32;
    let mut processed = 0u32;
    let mut closed = 0u32;
    let mut blocked = 0u32;
    let stopped;

    loop {
        // Reopen per poll so changes made by concurrent agents are seen.
        let queue = Queue::open(repo_root)?;
        let ready = queue.ready_tasks(opts.project.as_deref())?;

        let Some(task) = ready.into_iter().next() else {
            idle_streak += 1;
            progress(format, &format!("empty ready snapshot ({idle_streak}/{IDLE_POLL_LIMIT})"));
            if idle_streak >= IDLE_POLL_LIMIT {
                let note = format!(
                    "idle: no ready tasks for {} after {IDLE_POLL_LIMIT} polls",
                    opts.agent
                );
                let _ = mail.send(&opts.agent, &Target::Topic(TASK_TOPIC.into()), &note);
                append_ledger(
                    &queue,
                    &opts,
                    &loop_id,
                    RunRecord {
                        status: RunStatus::Idle,
                        exit_code: 0,
                        started_at: Utc::now(),
                        transcript: vec![note],
                    },
                )?;
                stopped = "idle";
                break;
            }
            if opts.poll_interval_secs > 0 {
                thread::sleep(Duration::from_secs(opts.poll_interval_secs));
            }
            continue;
        };
        idle_streak = 0;

        let claimed = match queue.claim(&task.id, &opts.agent) {
            Ok(task) => task,
            // Lost the race or the snapshot went stale; that is not
            // idleness, poll again immediately.
            Err(SwarmError::TaskClaimed(_, _)) | Err(SwarmError::TaskBlocked(_, _)) => continue,
            Err(e) => return Err(e),
        };

        let record = execute_task(repo_root, &queue, &mail, &opts, &claimed, format)?;
        match record.status {
            RunStatus::Closed => closed += 1,
            RunStatus::Blocked => blocked += 1,
            _ => {}
        }
        append_ledger(&queue, &opts, &loop_id, record)?;

        processed += 1;
        if let Some(max) = opts.max_tasks
            && processed >= max
        {
            stopped = "max_tasks";
            break;
        }
    }

    let summary = WorkSummary {
        agent: opts.agent.clone(),
        loop_id,
        processed,
        closed,
        blocked,
        stopped,
    };
    match format {
        Format::Json => output::print_envelope("work", &summary)?,
        Format::Pretty => println!(
            "{} processed={} closed={} blocked={} ({})",
            "work done".bold(),
            summary.processed,
            summary.closed,
            summary.blocked,
            summary.stopped
        ),
        Format::Minimal => println!(
            "work\t{}\t{}\t{}\t{}",
            summary.processed, summary.closed, summary.blocked, summary.stopped
        ),
    }
    Ok(())
}

fn execute_task(
    repo_root: &Path,
    queue: &Queue,
    mail: &MailStore,
    opts: &WorkOptions,
    task: &Task,
    format: Format,
) -> Result<RunRecord> {
    let started_at = Utc::now();
    let mut transcript = Vec::new();
    let topic = Target::Topic(TASK_TOPIC.into());
    let id = &task.id;

    let claim_note = format!("claim: {id} by {}", opts.agent);
    let _ = mail.send(&opts.agent, &topic, &claim_note);
    transcript.push(claim_note.clone());
    progress(format, &claim_note);

    let envs = [
        ("SV_TASK_ID", id.as_str()),
        ("SV_TASK_TITLE", task.title.as_str()),
    ];

    let mut failure: Option<(String, i32)> = None;

    if let Some(harness_cmd) = &opts.harness {
        let outcome = harness::run_shell(harness_cmd, repo_root, &envs);
        let line = format!("$ {harness_cmd} -> exit {}", outcome.exit_code);
        transcript.push(line.clone());
        progress(format, &line);
        if !outcome.passed {
            failure = Some((harness_cmd.clone(), outcome.exit_code));
        }
    }

    if failure.is_none() {
        for command in &task.validate {
            let outcome = harness::run_shell(command, repo_root, &envs);
            queue.record_validation(id, &opts.agent, command, outcome.exit_code)?;

            let note = format!("{id} progress: command={command} exit={}", outcome.exit_code);
            let _ = mail.send(&opts.agent, &topic, &note);
            transcript.push(note.clone());
            progress(format, &note);

            if !outcome.passed {
                failure = Some((command.clone(), outcome.exit_code));
                break;
            }
        }
    }

    match failure {
        None => {
            queue.close(id, &opts.agent, false)?;
            let note = format!("{id} closed by {}", opts.agent);
            let _ = mail.send(&opts.agent, &topic, &note);
            let _ = mail.send(
                &opts.agent,
                &Target::Agent(opts.notify.clone()),
                &format!("{id}: done"),
            );
            transcript.push(note.clone());
            progress(format, &note);
            Ok(RunRecord {
                status: RunStatus::Closed,
                exit_code: 0,
                started_at,
                transcript,
            })
        }
        Some((command, exit_code)) => {
            // The task stays in_progress with a blocker note; the stale
            // auditor reopens it if nobody comes back to it.
            let reason = format!(
                "blocked: command={command} exit={exit_code} reason=validation failed; requested_unblock=rerun after fix"
            );
            queue.comment(id, &opts.agent, &reason)?;
            let note = format!("{id} {reason}");
            let _ = mail.send(&opts.agent, &topic, &note);
            transcript.push(note.clone());
            progress(format, &note);
            Ok(RunRecord {
                status: RunStatus::Blocked,
                exit_code,
                started_at,
                transcript,
            })
        }
    }
}

fn append_ledger(
    queue: &Queue,
    opts: &WorkOptions,
    loop_id: &str,
    record: RunRecord,
) -> Result<()> {
    queue.ledger.append(&LedgerEntry {
        loop_id: loop_id.to_string(),
        loop_name: opts.agent.clone(),
        run_id: uuid::Uuid::new_v4().to_string(),
        status: record.status,
        profile: opts.profile.clone(),
        harness: opts.harness.clone(),
        started_at: record.started_at,
        finished_at: Utc::now(),
        exit_code: record.exit_code,
        transcript: record.transcript,
    })
}

fn progress(format: Format, line: &str) {
    if format == Format::Pretty {
        println!("  {}", line.dimmed());
    }
}
