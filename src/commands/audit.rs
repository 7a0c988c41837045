use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::mail::{MailStore, Target};
use crate::store::queue::Queue;

/// Default staleness window: 45 minutes without an update.
pub const DEFAULT_THRESHOLD_SECS: i64 = 2700;

/// How long a stale-check notice stays unanswered before the auditor
/// reopens the task.
pub const DEFAULT_GRACE_SECS: i64 = 300;

const TASK_TOPIC: &str = "task";

pub struct AuditOptions {
    pub auditor: String,
    pub project: Option<String>,
    pub threshold_secs: i64,
    pub grace_secs: i64,
    pub watch: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub scanned: usize,
    pub noticed: Vec<String>,
    pub reopened: Vec<String>,
}

pub fn run(repo_root: &Path, opts: AuditOptions, format: Format) -> Result<()> {
    crate::agent::validate_name(&opts.auditor)?;
    loop {
        let report = scan(repo_root, &opts)?;
        print_report(&report, format)?;
        if !opts.watch {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(opts.interval_secs.max(1)));
    }
}

/// One audit pass over in-progress tasks.
///
/// Two-phase: a stale task first gets a stale-check notice; if it is still
/// untouched once the notice has aged past the grace window, it is
/// reopened for another agent to claim.
pub fn scan(repo_root: &Path, opts: &AuditOptions) -> Result<AuditReport> {
    let queue = Queue::open(repo_root)?;
    let mail = MailStore::open(repo_root);
    let topic = Target::Topic(TASK_TOPIC.into());
    let now = Utc::now();

    let stale = queue.stale_tasks(opts.project.as_deref(), opts.threshold_secs)?;
    let mut report = AuditReport {
        scanned: stale.len(),
        noticed: vec![],
        reopened: vec![],
    };

    for task in &stale {
        let idle = task.idle_secs(now);
        match queue.events.stale_check_since(&task.id, task.updated_at)? {
            None => {
                queue.mark_stale_check(&task.id, &opts.auditor, idle)?;
                let holder = queue
                    .holder(&task.id)?
                    .unwrap_or_else(|| task.updated_by.clone());
                let _ = mail.send(
                    &opts.auditor,
                    &topic,
                    &format!("stale-check: {} owner={holder} idle={idle}s", task.id),
                );
                report.noticed.push(task.id.to_string());
            }
            Some(check) if (now - check.at).num_seconds() >= opts.grace_secs => {
                queue.stale_reopen(&task.id, &opts.auditor)?;
                let _ = mail.send(
                    &opts.auditor,
                    &topic,
                    &format!("stale-reopen: {} after {idle}s without updates", task.id),
                );
                report.reopened.push(task.id.to_string());
            }
            // Notice issued, grace window still open.
            Some(_) => {}
        }
    }

    Ok(report)
}

fn print_report(report: &AuditReport, format: Format) -> Result<()> {
    match format {
        Format::Json => output::print_envelope("audit", report)?,
        Format::Pretty => {
            println!(
                "{} scanned={} noticed={} reopened={}",
                "audit".cyan().bold(),
                report.scanned,
                report.noticed.len(),
                report.reopened.len()
            );
            for id in &report.noticed {
                println!("  {} {}", "stale-check".yellow(), id);
            }
            for id in &report.reopened {
                println!("  {} {}", "stale-reopen".red(), id);
            }
        }
        Format::Minimal => println!(
            "audit\t{}\t{}\t{}",
            report.scanned,
            report.noticed.len(),
            report.reopened.len()
        ),
    }
    Ok(())
}
