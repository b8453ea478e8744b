use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Inspect and replay the offline write queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List pending operations, oldest first
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the number of pending operations
    Count,
    /// Replay pending operations against the configured backend
    Sync,
    /// List unresolved conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a conflict resolved
    Resolve {
        /// Conflict key, e.g. attendance-42
        key: String,
    },
    /// Print a cached collection
    Cache {
        /// Cache key, usually the table name
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
