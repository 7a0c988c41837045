use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use swarm::error::Result;
use swarm::output::{self, Format};
use swarm::store::mail::{find_mail_root, MailStore, Message, Target};

#[derive(Parser)]
#[command(
    name = "fmail",
    version,
    about = "Durable inter-agent messaging for swarm coordination"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    format: Format,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an agent identity, generating a display name if omitted
    Register {
        /// Agent name (auto-generated if omitted)
        #[arg(long)]
        name: Option<String>,
    },
    /// Send a message to a topic or, with an @ prefix, an agent inbox
    Send {
        /// Destination: `<topic>` or `@<agent>`
        target: String,
        /// Message text
        message: String,
        /// Sender identity (default: $FMAIL_AGENT, then $FORGE_LOOP_NAME)
        #[arg(long)]
        agent: Option<String>,
    },
    /// Print a topic's messages, oldest first
    Log {
        topic: String,
        /// Show only the last N messages
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Read an agent's direct messages
    Inbox {
        /// Agent name (default: resolved identity)
        #[arg(long)]
        name: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// List topics with message counts
    Topics,
}

#[derive(Serialize)]
struct LogData<'a> {
    topic: &'a str,
    total: usize,
    messages: &'a [Message],
}

#[derive(Serialize)]
struct TopicsData {
    total: usize,
    topics: Vec<TopicEntry>,
}

#[derive(Serialize)]
struct TopicEntry {
    topic: String,
    messages: usize,
}

fn resolve_agent_arg(flag: Option<String>) -> String {
    flag.or_else(swarm::agent::resolve_agent)
        .unwrap_or_else(swarm::agent::generated_name)
}

fn print_messages(command: &str, topic: &str, messages: &[Message], format: Format) -> Result<()> {
    match format {
        Format::Json => output::print_envelope(
            command,
            &LogData {
                topic,
                total: messages.len(),
                messages,
            },
        )?,
        Format::Pretty | Format::Minimal => {
            for msg in messages {
                println!("{}", msg.log_line());
            }
        }
    }
    Ok(())
}

fn run(cli: Cli, format: Format) -> Result<()> {
    let root = find_mail_root();
    let mail = MailStore::open(&root);

    match cli.command {
        Commands::Register { name } => {
            let reg = mail.register(name.as_deref(), None)?;
            match format {
                Format::Json => output::print_envelope("register", &reg)?,
                Format::Pretty => println!("{}", reg.name.bold()),
                Format::Minimal => println!("{}", reg.name),
            }
        }
        Commands::Send {
            target,
            message,
            agent,
        } => {
            let sender = resolve_agent_arg(agent);
            let target = Target::parse(&target)?;
            let msg = mail.send(&sender, &target, &message)?;
            match format {
                Format::Json => output::print_envelope("send", &msg)?,
                Format::Pretty | Format::Minimal => println!("{}", msg.id),
            }
        }
        Commands::Log { topic, limit } => {
            let messages = mail.log(&topic, Some(limit))?;
            print_messages("log", &topic, &messages, format)?;
        }
        Commands::Inbox { name, limit } => {
            let name = resolve_agent_arg(name);
            let messages = mail.inbox(&name, Some(limit))?;
            print_messages("inbox", &format!("@{name}"), &messages, format)?;
        }
        Commands::Topics => {
            let topics = mail.topics()?;
            match format {
                Format::Json => output::print_envelope(
                    "topics",
                    &TopicsData {
                        total: topics.len(),
                        topics: topics
                            .into_iter()
                            .map(|(topic, messages)| TopicEntry { topic, messages })
                            .collect(),
                    },
                )?,
                Format::Pretty | Format::Minimal => {
                    for (topic, count) in topics {
                        println!("{topic} ({count})");
                    }
                }
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let format = cli.format;
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
