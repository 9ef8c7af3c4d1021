//! Configuration for keelson.
//!
//! ## config.kdl - Engine settings
//!
//! Located in the data directory (`~/.local/share/keelson/<repo-hash>/config.kdl`
//! unless overridden). Contains:
//! - `state-file`, `tickets-file`, `features-file`, `modules-file` - file locations
//! - `max-backups`, `compress-after-hours` - backup retention
//! - `history-limit` - history entries kept in the state file
//! - `save-debounce-ms`, `lock-retries`, `lock-base-delay-ms` - write tuning
//! - `git-automation` - commit manual milestone completions
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_FILE_NAME, PathOverrides, Resolved, ResolvedSettings, ValueSource, load_config,
    resolve_data_dir, resolve_repo_path, resolve_settings,
};
pub use schema::EngineConfig;
