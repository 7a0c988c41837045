use clap::{Parser, Subcommand};
use swarm::commands;
use swarm::commands::audit::{AuditOptions, DEFAULT_GRACE_SECS, DEFAULT_THRESHOLD_SECS};
use swarm::commands::work::WorkOptions;
use swarm::model::Priority;
use swarm::output::Format;

fn version_string() -> &'static str {
    let s = match swarm::build_info::git_sha() {
        Some(sha) => format!("{} ({})", env!("CARGO_PKG_VERSION"), &sha[..7.min(sha.len())]),
        None => env!("CARGO_PKG_VERSION").to_string(),
    };
    Box::leak(s.into_boxed_str())
}

#[derive(Parser)]
#[command(
    name = "sv",
    version = version_string(),
    about = "Project-scoped task queue for multi-agent swarms"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Shorthand for --format json
    #[arg(long, global = true, hide = true, conflicts_with = "pretty")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .tasks/ directory in the current repository
    Init {
        /// Project name (default: repository directory name)
        #[arg(long)]
        project: Option<String>,
    },
    /// Task queue operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Run the agent loop: poll, claim, execute, report
    Work {
        /// Agent identity (default: $FMAIL_AGENT, then $FORGE_LOOP_NAME, then generated)
        #[arg(long)]
        agent: Option<String>,
        /// Only work tasks in this project
        #[arg(long)]
        project: Option<String>,
        /// Profile label recorded in the run ledger
        #[arg(long)]
        profile: Option<String>,
        /// Harness command run for each claimed task (sh -c, SV_TASK_* in env)
        #[arg(long)]
        harness: Option<String>,
        /// Agent notified directly when a task closes
        #[arg(long, default_value = "forge-orchestrator")]
        notify: String,
        /// Stop after processing this many tasks
        #[arg(long)]
        max_tasks: Option<u32>,
        /// Seconds to sleep between empty ready snapshots
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
    },
    /// Scan in-progress tasks and reopen stale ones
    Audit {
        /// Auditor identity
        #[arg(long)]
        agent: Option<String>,
        /// Only audit tasks in this project
        #[arg(long)]
        project: Option<String>,
        /// Staleness threshold in seconds
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_SECS)]
        threshold_secs: i64,
        /// Seconds a stale-check notice stays unanswered before reopen
        #[arg(long, default_value_t = DEFAULT_GRACE_SECS)]
        grace_secs: i64,
        /// Keep scanning on an interval instead of exiting after one pass
        #[arg(long)]
        watch: bool,
        /// Seconds between scans with --watch
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
    /// Commit accumulated working-tree changes (committer role)
    Commit {
        /// Commit message (default: generated summary)
        #[arg(long, short)]
        message: Option<String>,
        /// Committer identity
        #[arg(long)]
        agent: Option<String>,
    },
    /// Show loop run ledgers
    Ledger {
        /// Loop name (omit to list known loops)
        loop_name: Option<String>,
        /// Show only the last N runs
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a new task
    Create {
        /// Task title
        title: String,
        /// Project scope (default: the project recorded at init)
        #[arg(long)]
        project: Option<String>,
        /// Task body
        #[arg(long, short)]
        body: Option<String>,
        /// Task priority
        #[arg(long, value_enum, default_value = "p2")]
        priority: Priority,
        /// Task IDs that must close first (comma-separated)
        #[arg(long, value_delimiter = ',')]
        blocked_by: Vec<String>,
        /// Validation command gating close (repeatable)
        #[arg(long = "validate")]
        validate: Vec<String>,
        /// Creator identity
        #[arg(long)]
        agent: Option<String>,
    },
    /// Snapshot ready tasks (open, all blockers closed)
    Ready {
        #[arg(long)]
        project: Option<String>,
    },
    /// List tasks by stored status
    List {
        #[arg(long)]
        project: Option<String>,
        /// Filter by status (open, in_progress, closed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Display a task with its event history
    Show {
        /// Task ID (unique prefixes accepted)
        id: String,
    },
    /// Atomically claim a task
    Start {
        id: String,
        #[arg(long)]
        agent: Option<String>,
    },
    /// Close an in-progress task (validation-gated)
    Close {
        id: String,
        #[arg(long)]
        agent: Option<String>,
        /// Skip holder and validation checks
        #[arg(long)]
        force: bool,
    },
    /// Hand an in-progress task back to the queue
    Release {
        id: String,
        /// Why the task is being handed back
        #[arg(long, required = true)]
        reason: String,
        #[arg(long)]
        agent: Option<String>,
        /// Release even if held by another agent
        #[arg(long)]
        force: bool,
    },
    /// Append a comment (counts as holder activity)
    Comment {
        id: String,
        text: String,
        #[arg(long)]
        agent: Option<String>,
    },
    /// Run and record the task's validation commands
    Validate {
        id: String,
        #[arg(long)]
        agent: Option<String>,
    },
}

fn resolve_agent_arg(flag: Option<String>) -> String {
    flag.or_else(swarm::agent::resolve_agent)
        .unwrap_or_else(swarm::agent::generated_name)
}

fn run(cli: Cli, format: Format) -> swarm::error::Result<()> {
    // init runs before repo discovery
    if let Commands::Init { project } = &cli.command {
        let cwd = std::env::current_dir()?;
        return commands::init::run(&cwd, project.clone(), format);
    }

    let root = swarm::store::tasks::find_repo_root()?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Task { action } => match action {
            TaskAction::Create {
                title,
                project,
                body,
                priority,
                blocked_by,
                validate,
                agent,
            } => commands::create::run(
                &root,
                title,
                project,
                body,
                priority,
                blocked_by,
                validate,
                resolve_agent_arg(agent),
                format,
            ),
            TaskAction::Ready { project } => commands::ready::run(&root, project, format),
            TaskAction::List { project, status } => {
                commands::list::run(&root, project, status, format)
            }
            TaskAction::Show { id } => commands::show::run(&root, id, format),
            TaskAction::Start { id, agent } => {
                commands::lifecycle::start(&root, id, resolve_agent_arg(agent), format)
            }
            TaskAction::Close { id, agent, force } => {
                commands::lifecycle::close(&root, id, resolve_agent_arg(agent), force, format)
            }
            TaskAction::Release {
                id,
                reason,
                agent,
                force,
            } => commands::lifecycle::release(
                &root,
                id,
                resolve_agent_arg(agent),
                reason,
                force,
                format,
            ),
            TaskAction::Comment { id, text, agent } => {
                commands::comment::run(&root, id, text, resolve_agent_arg(agent), format)
            }
            TaskAction::Validate { id, agent } => {
                commands::validate::run(&root, id, resolve_agent_arg(agent), format)
            }
        },
        Commands::Work {
            agent,
            project,
            profile,
            harness,
            notify,
            max_tasks,
            poll_interval,
        } => commands::work::run(
            &root,
            WorkOptions {
                agent: resolve_agent_arg(agent),
                project,
                profile,
                harness,
                notify,
                max_tasks,
                poll_interval_secs: poll_interval,
            },
            format,
        ),
        Commands::Audit {
            agent,
            project,
            threshold_secs,
            grace_secs,
            watch,
            interval_secs,
        } => commands::audit::run(
            &root,
            AuditOptions {
                auditor: resolve_agent_arg(agent),
                project,
                threshold_secs,
                grace_secs,
                watch,
                interval_secs,
            },
            format,
        ),
        Commands::Commit { message, agent } => {
            commands::commit::run(&root, message, resolve_agent_arg(agent), format)
        }
        Commands::Ledger { loop_name, limit } => {
            commands::ledger::run(&root, loop_name, limit, format)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else if cli.json {
        Format::Json
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "status": "error",
                        "error": {
                            "message": e.to_string(),
                            "code": e.code(),
                            "kind": e.kind(),
                        }
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
