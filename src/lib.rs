//! Keelson - a roadmap state engine.
//!
//! This library provides the core functionality for the `kl` CLI tool:
//! milestone dependency gating, cascade propagation, the status state
//! machine, and crash-safe persistence of the roadmap state file.

pub mod cli;
pub mod commands;
pub mod config;
pub mod events;
pub mod git;
pub mod models;
pub mod roadmap;
pub mod storage;


/// Library-level error type for roadmap operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Kdl(String),

    #[error("Unknown milestone: {0}")]
    UnknownMilestone(String),

    #[error("No updates provided")]
    NoUpdates,

    #[error("Unknown roadmap status: {0}")]
    UnknownStatus(String),

    #[error("Invalid roadmap status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to acquire roadmap state lock")]
    LockUnavailable,

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Milestone already exists: {0}")]
    DuplicateMilestone(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for roadmap operations.
pub type Result<T> = std::result::Result<T, Error>;
