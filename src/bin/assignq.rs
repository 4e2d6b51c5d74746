//! assignq CLI — operator interface to the assignment queue.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use assignq::config::EngineConfig;
use assignq::engine::{Engine, Notifier, WorkItemService};
use assignq::error::Result;
use assignq::model::{AssignmentResult, NewQueueEntry, Priority, QueueEntry, WorkItemKey};
use assignq::store::{EnqueueResult, QueueStore};
use assignq::telemetry::init_logging;

#[derive(Parser)]
#[command(name = "assignq", about = "Assignment queue processing engine")]
struct Cli {
    /// Path to the queue database
    #[arg(long, default_value = "assignq.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a work item for assignment
    Enqueue {
        /// Work item identifier in the owning system
        work_item_id: String,
        /// Work item kind (e.g. ticket, task, dossier-item)
        work_item_type: String,
        /// Required skill (repeatable, at least one)
        #[arg(long = "skill", required = true)]
        skills: Vec<String>,
        /// Priority: urgent, high, normal, low
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Cancel the active entry for a work item
    Cancel {
        work_item_id: String,
        work_item_type: String,
    },
    /// List pending entries in matching order
    List,
    /// Pending depth per (priority, skill) bucket
    Depths,
    /// Show engine events
    Events {
        /// Only events after this sequence number
        #[arg(long, default_value_t = 0)]
        since: u64,
    },
    /// Revert stale claims to pending
    Recover,
}

/// Stand-in collaborators for operator use: everything lands in the log.
struct LogCollaborator;

impl WorkItemService for LogCollaborator {
    fn record_assignment(&self, result: &AssignmentResult) -> anyhow::Result<()> {
        info!(entry = %result.queue_entry_id, assignee = %result.assignee_id, "assignment recorded");
        Ok(())
    }
}

impl Notifier for LogCollaborator {
    fn assignment_made(&self, result: &AssignmentResult) -> anyhow::Result<()> {
        info!(entry = %result.queue_entry_id, assignee = %result.assignee_id, "assignment made");
        Ok(())
    }

    fn entry_escalated(&self, entry: &QueueEntry) -> anyhow::Result<()> {
        info!(id = %entry.id, key = %entry.key, "entry escalated");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let store = QueueStore::open(&cli.db)?;
    let collaborator = Arc::new(LogCollaborator);
    let engine = Engine::new(
        store,
        collaborator.clone(),
        collaborator,
        EngineConfig::from_env()?,
    );

    match cli.command {
        Command::Enqueue {
            work_item_id,
            work_item_type,
            skills,
            priority,
        } => {
            let new = NewQueueEntry::new(work_item_id, work_item_type)
                .skills(skills.into_iter().collect())
                .priority(Priority::parse(&priority)?);
            match engine.enqueue(new)? {
                EnqueueResult::Created(entry) => {
                    println!("created {} ({} {})", entry.id, entry.priority, entry.key);
                }
                EnqueueResult::Existing(entry) => {
                    println!("already queued as {} ({})", entry.id, entry.status);
                }
            }
        }
        Command::Cancel {
            work_item_id,
            work_item_type,
        } => {
            let key = WorkItemKey::new(work_item_id, work_item_type);
            match engine.cancel(&key)? {
                Some(entry) => println!("cancelled {} ({})", entry.id, entry.key),
                None => println!("no active entry for {key}"),
            }
        }
        Command::List => {
            for entry in engine.pending()? {
                println!(
                    "{}  {:<7} {:>2} attempts  {}  [{}]",
                    entry.id, entry.priority, entry.attempts, entry.key, entry.required_skills
                );
            }
        }
        Command::Depths => {
            for bucket in engine.queue_depths()? {
                println!("{:<7} {:<24} {}", bucket.priority, bucket.skill, bucket.depth);
            }
        }
        Command::Events { since } => {
            for event in engine.events_since(since)? {
                println!(
                    "{:>6}  {}  {}",
                    event.seq,
                    event.timestamp.to_rfc3339(),
                    serde_json::to_string(&event.kind).unwrap_or_default()
                );
            }
        }
        Command::Recover => {
            let recovered = engine.recover_stale_claims()?;
            println!("recovered {} stale claim(s)", recovered.len());
        }
    }

    Ok(())
}
