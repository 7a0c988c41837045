use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::ledger::{LedgerEntry, LedgerStore};
use crate::store::tasks::TaskStore;

#[derive(Serialize)]
struct LedgerData<'a> {
    loop_name: &'a str,
    total: usize,
    runs: &'a [LedgerEntry],
}

#[derive(Serialize)]
struct LoopsData {
    total: usize,
    loops: Vec<String>,
}

/// Show a loop's run history, or list known loops when no name is given.
pub fn run(
    repo_root: &Path,
    loop_name: Option<String>,
    limit: Option<usize>,
    format: Format,
) -> Result<()> {
    let store = TaskStore::open(repo_root)?;
    let ledger = LedgerStore::open(store.root());

    let Some(loop_name) = loop_name else {
        let loops = ledger.loops()?;
        match format {
            Format::Json => output::print_envelope(
                "ledger.loops",
                &LoopsData {
                    total: loops.len(),
                    loops,
                },
            )?,
            Format::Pretty | Format::Minimal => {
                for name in loops {
                    println!("{name}");
                }
            }
        }
        return Ok(());
    };

    let runs = ledger.read(&loop_name, limit)?;
    match format {
        Format::Json => output::print_envelope(
            "ledger",
            &LedgerData {
                loop_name: &loop_name,
                total: runs.len(),
                runs: &runs,
            },
        )?,
        Format::Pretty => {
            for entry in &runs {
                println!(
                    "{} {} {} exit={}",
                    entry.started_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    entry.run_id,
                    entry.status.to_string().bold(),
                    entry.exit_code
                );
                for line in &entry.transcript {
                    println!("  {}", line.dimmed());
                }
            }
        }
        Format::Minimal => {
            for entry in &runs {
                println!("{}\t{}\t{}", entry.run_id, entry.status, entry.exit_code);
            }
        }
    }
    Ok(())
}
