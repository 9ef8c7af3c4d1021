//! Precedence resolution for paths and engine settings.
//!
//! ## Repository path (highest to lowest)
//!
//! 1. `-C/--repo` flag or `KEELSON_REPO`, used literally
//! 2. Git root detected from the current directory
//! 3. Current directory
//!
//! ## Data directory (highest to lowest)
//!
//! 1. `--data-dir` flag
//! 2. `KEELSON_DATA_DIR` environment variable
//! 3. `~/.local/share/keelson/<repo-hash>/`
//!
//! ## Settings
//!
//! config.kdl in the data directory, then built-in defaults.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::schema::*;
use crate::storage::{
    BackupRetention, DATA_DIR_ENV, LockOptions, StoreOptions, find_git_root, hashed_storage_dir,
};
use crate::{Error, Result};

/// Config file name inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from CLI flag
    CliFlag,
    /// Value from config.kdl
    ConfigFile,
    /// Detected from the enclosing git repository
    GitRoot,
    /// The current working directory
    CurrentDir,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::GitRoot => write!(f, "git-root"),
            ValueSource::CurrentDir => write!(f, "cwd"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub repo: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Everything the engine needs to start.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSettings {
    pub repo_path: Resolved<PathBuf>,
    pub data_dir: Resolved<PathBuf>,
    pub config_path: PathBuf,
    pub state_file: Resolved<PathBuf>,
    pub tickets_file: Resolved<PathBuf>,
    pub features_file: Resolved<PathBuf>,
    pub modules_file: Resolved<PathBuf>,
    pub max_backups: Resolved<u32>,
    pub compress_after_hours: Resolved<u64>,
    pub history_limit: Resolved<u32>,
    pub save_debounce_ms: Resolved<u64>,
    pub lock_retries: Resolved<u32>,
    pub lock_base_delay_ms: Resolved<u64>,
    pub git_automation: Resolved<bool>,
}

impl ResolvedSettings {
    /// Store tunables derived from these settings.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            history_limit: self.history_limit.value as usize,
            lock: LockOptions {
                attempts: self.lock_retries.value,
                base_delay: Duration::from_millis(self.lock_base_delay_ms.value),
            },
            retention: BackupRetention {
                max_backups: self.max_backups.value as usize,
                compress_after: Duration::from_secs(
                    self.compress_after_hours.value.saturating_mul(60 * 60),
                ),
            },
            save_debounce: Duration::from_millis(self.save_debounce_ms.value),
        }
    }
}

/// Resolve the repository path.
///
/// An explicit path is used literally and must exist. Otherwise the git root
/// above the current directory wins, falling back to the current directory.
pub fn resolve_repo_path(explicit: Option<PathBuf>) -> Result<Resolved<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::InvalidInput(format!(
                "Specified repo path does not exist: {}",
                path.display()
            )));
        }
        return Ok(Resolved::new(path, ValueSource::CliFlag));
    }

    let cwd = std::env::current_dir()?;
    Ok(match find_git_root(&cwd) {
        Some(root) => Resolved::new(root, ValueSource::GitRoot),
        None => Resolved::new(cwd, ValueSource::CurrentDir),
    })
}

/// Resolve the data directory for `repo_path`.
pub fn resolve_data_dir(repo_path: &Path, explicit: Option<PathBuf>) -> Result<Resolved<PathBuf>> {
    if let Some(dir) = explicit {
        return Ok(Resolved::new(dir, ValueSource::CliFlag));
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(Resolved::new(
                PathBuf::from(dir),
                ValueSource::EnvVar(DATA_DIR_ENV.to_string()),
            ));
        }
    }
    Ok(Resolved::new(hashed_storage_dir(repo_path)?, ValueSource::Default))
}

/// Read config.kdl from `path`. A missing file yields an empty config.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::new());
    }

    let content = std::fs::read_to_string(path)?;
    let doc: kdl::KdlDocument = content
        .parse()
        .map_err(|e| Error::Kdl(format!("{}: {}", path.display(), e)))?;

    let config = EngineConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|msg| Error::InvalidInput(format!("{}: {}", path.display(), msg)))?;
    Ok(config)
}

/// Resolve paths and settings with full precedence.
pub fn resolve_settings(overrides: &PathOverrides) -> Result<ResolvedSettings> {
    let repo_path = resolve_repo_path(overrides.repo.clone())?;
    let data_dir = resolve_data_dir(&repo_path.value, overrides.data_dir.clone())?;
    let config_path = data_dir.value.join(CONFIG_FILE_NAME);
    let config = load_config(&config_path)?;

    let file = |value: &Option<String>, default: &str| {
        let (name, source) = match value {
            Some(name) => (name.as_str(), ValueSource::ConfigFile),
            None => (default, ValueSource::Default),
        };
        Resolved::new(data_dir.value.join(name), source)
    };
    fn setting<T: Copy>(value: Option<T>, default: T) -> Resolved<T> {
        match value {
            Some(v) => Resolved::new(v, ValueSource::ConfigFile),
            None => Resolved::new(default, ValueSource::Default),
        }
    }

    Ok(ResolvedSettings {
        state_file: file(&config.state_file, DEFAULT_STATE_FILE),
        tickets_file: file(&config.tickets_file, DEFAULT_TICKETS_FILE),
        features_file: file(&config.features_file, DEFAULT_FEATURES_FILE),
        modules_file: file(&config.modules_file, DEFAULT_MODULES_FILE),
        max_backups: setting(config.max_backups, DEFAULT_MAX_BACKUPS),
        compress_after_hours: setting(config.compress_after_hours, DEFAULT_COMPRESS_AFTER_HOURS),
        history_limit: setting(config.history_limit, DEFAULT_HISTORY_LIMIT),
        save_debounce_ms: setting(config.save_debounce_ms, DEFAULT_SAVE_DEBOUNCE_MS),
        lock_retries: setting(config.lock_retries, DEFAULT_LOCK_RETRIES),
        lock_base_delay_ms: setting(config.lock_base_delay_ms, DEFAULT_LOCK_BASE_DELAY_MS),
        git_automation: setting(config.git_automation, true),
        config_path,
        repo_path,
        data_dir,
    })
}
