//! CLI argument definitions for keelson.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keelson - a roadmap state engine.
///
/// Start with `kl show` to see the roadmap, then `kl milestone update` to move it.
#[derive(Parser, Debug)]
#[command(name = "kl")]
#[command(author, version, about = "Keep a dependency-gated roadmap consistent on disk", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if kl was started in <path> instead of the current directory.
    /// The path must exist. Bypasses git root detection - uses the path literally.
    /// Can also be set via KEELSON_REPO environment variable.
    #[arg(short = 'C', long = "repo", global = true, env = "KEELSON_REPO")]
    pub repo_path: Option<PathBuf>,

    /// Directory holding the state file, backups and config.kdl.
    /// Defaults to KEELSON_DATA_DIR, then a per-repository data directory.
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the roadmap, or one milestone by ID
    Show {
        /// Milestone ID
        id: Option<String>,
    },

    /// Milestone management commands
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },

    /// Re-derive every milestone from tickets, features and modules
    Sync {
        /// Reason recorded in history
        #[arg(long, default_value = "roadmap:sync")]
        reason: String,

        /// Write through the debounced save queue instead of immediately
        #[arg(long)]
        debounced: bool,
    },

    /// Show recent history entries
    History {
        /// Maximum number of entries to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Backup commands
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Milestone subcommands
#[derive(Subcommand, Debug)]
pub enum MilestoneCommands {
    /// Add a new milestone
    Add {
        /// Milestone ID
        id: String,

        /// Milestone title
        title: String,

        /// Milestone description
        #[arg(short, long)]
        description: Option<String>,

        /// Initial status (pending, active, paused, blocked, completed)
        #[arg(long)]
        status: Option<String>,

        /// Initial progress (0-100), used when nothing is linked
        #[arg(long)]
        progress: Option<i64>,

        /// Milestone this one depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        /// Linked ticket ID (repeatable)
        #[arg(long = "ticket")]
        tickets: Vec<String>,

        /// Linked feature ID (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,

        /// Linked module ID (repeatable)
        #[arg(long = "module")]
        modules: Vec<String>,

        /// Who is making the change
        #[arg(long, env = "KEELSON_ACTOR")]
        actor: Option<String>,
    },

    /// Update a milestone (status: pending, active, paused, blocked, completed)
    Update {
        /// Milestone ID
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New status
        #[arg(long)]
        status: Option<String>,

        /// New progress (clamped to 0-100)
        #[arg(long, allow_negative_numbers = true)]
        progress: Option<i64>,

        /// Replace dependencies (comma-separated; empty string clears)
        #[arg(long, value_delimiter = ',')]
        dependencies: Option<Vec<String>>,

        /// Replace linked tickets (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tickets: Option<Vec<String>>,

        /// Replace linked features (comma-separated)
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Replace linked modules (comma-separated)
        #[arg(long, value_delimiter = ',')]
        modules: Option<Vec<String>>,

        /// Completion summary
        #[arg(long)]
        summary: Option<String>,

        /// Reason recorded in history
        #[arg(long, default_value = "roadmap:manual")]
        reason: String,

        /// Who is making the change
        #[arg(long, env = "KEELSON_ACTOR")]
        actor: Option<String>,

        /// Never commit, even when completing by hand
        #[arg(long)]
        no_git: bool,
    },
}

/// Backup subcommands
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// List backups, most recent first
    List,

    /// Replace the current state with a backup
    Rollback {
        /// Backup filename (as shown by `kl backup list`)
        filename: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved paths and settings with their sources
    Show,
}
