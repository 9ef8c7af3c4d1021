//! Storage layer for the roadmap state.
//!
//! The roadmap lives in a single JSON document (`roadmap-state.json` by
//! default) inside the per-repository data directory:
//!
//! ```text
//! ~/.local/share/keelson/<repo-hash>/
//!   roadmap-state.json        live state, replaced by atomic rename
//!   roadmap-state.json.lock   present while a writer holds the lock
//!   backups/                  roadmap-state-<timestamp>.json[.gz]
//! ```
//!
//! [`StateStore`] owns the in-memory cache, the lockfile protocol, backups
//! and the debounced save queue. Readers never lock; they may see a slightly
//! stale snapshot when another process writes concurrently.

pub mod backup;
pub mod domain;
pub mod lock;
pub mod queue;

pub use backup::{BackupInfo, BackupManager, BackupRetention, CleanupReport};
pub use domain::{DomainLoader, JsonDomainLoader, StaticDomainLoader, load_json};
pub use lock::{LockOptions, StateLock};
pub use queue::{FlushInput, Flushed, SaveQueue, StateFactory, StateWriter};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::models::graph::DependencyGraph;
use crate::models::{DEFAULT_HISTORY_LIMIT, RoadmapState};
use crate::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "KEELSON_DATA_DIR";

/// Default state filename inside the data directory.
pub const STATE_FILE_NAME: &str = "roadmap-state.json";

/// Whether a write snapshots the previous file first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithBackup,
    WithoutBackup,
}

/// Tunables for a [`StateStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub history_limit: usize,
    pub lock: LockOptions,
    pub retention: BackupRetention,
    pub save_debounce: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            lock: LockOptions::default(),
            retention: BackupRetention::default(),
            save_debounce: Duration::from_millis(1000),
        }
    }
}

/// File-backed roadmap state with a process-local cache.
#[derive(Debug)]
pub struct StateStore {
    inner: Arc<StoreInner>,
    queue: OnceLock<SaveQueue>,
}

#[derive(Debug)]
struct StoreInner {
    state_path: PathBuf,
    lock_path: PathBuf,
    backups: BackupManager,
    options: StoreOptions,
    cache: RwLock<Option<RoadmapState>>,
    /// Held across every read-modify-write of the state in this process
    updates: Mutex<()>,
}

impl StateStore {
    /// Create a store for the state file at `state_path`.
    ///
    /// Nothing is read until [`StateStore::load`] or [`StateStore::state`].
    pub fn new(state_path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let state_path = state_path.into();
        let backups_dir = state_path
            .parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"));

        Self {
            inner: Arc::new(StoreInner {
                lock_path: StateLock::path_for(&state_path),
                backups: BackupManager::new(backups_dir, options.retention),
                state_path,
                options,
                cache: RwLock::new(None),
                updates: Mutex::new(()),
            }),
            queue: OnceLock::new(),
        }
    }

    /// Open the default state file inside a data directory.
    pub fn open_in(data_dir: &Path, options: StoreOptions) -> Self {
        Self::new(data_dir.join(STATE_FILE_NAME), options)
    }

    /// Get the path to the state file.
    pub fn state_path(&self) -> &Path {
        &self.inner.state_path
    }

    /// Get the path to the lockfile.
    pub fn lock_path(&self) -> &Path {
        &self.inner.lock_path
    }

    pub fn backups(&self) -> &BackupManager {
        &self.inner.backups
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Read the state file from disk, refreshing the cache.
    ///
    /// A missing or corrupt file is replaced with a default state. Corrupt
    /// contents are kept as a backup before being overwritten.
    pub async fn load(&self) -> Result<RoadmapState> {
        self.inner.load().await
    }

    /// Serialize a read-modify-write against other writers in this process,
    /// including debounced flushes. Hold the guard from reading the state
    /// until the write returns.
    pub async fn lock_updates(&self) -> MutexGuard<'_, ()> {
        self.inner.updates.lock().await
    }

    /// The cached state, loading it on first use.
    pub async fn state(&self) -> Result<RoadmapState> {
        if let Some(state) = self.inner.cache.read().await.as_ref() {
            return Ok(state.clone());
        }
        self.load().await
    }

    /// The cached state without touching disk.
    pub async fn cached(&self) -> Option<RoadmapState> {
        self.inner.cache.read().await.clone()
    }

    /// Persist `state` immediately and return what was written.
    ///
    /// Callers that derived `state` from an earlier read should hold
    /// [`StateStore::lock_updates`].
    pub async fn write_now(&self, state: RoadmapState, mode: WriteMode) -> Result<RoadmapState> {
        self.inner.write(state, mode).await
    }

    /// Queue a backed-up write through the debounced save queue.
    ///
    /// The factory runs at flush time under [`StateStore::lock_updates`],
    /// against the state re-read from disk. Resolves with what was actually
    /// persisted, which may come from a later factory in the same batch.
    /// Must not be awaited while holding the update guard.
    pub async fn schedule_save(&self, factory: StateFactory) -> Result<Flushed> {
        let queue = self
            .queue
            .get_or_init(|| SaveQueue::spawn(self.inner.clone(), self.inner.options.save_debounce));
        queue.schedule(factory).await
    }

    /// Replace the live state with the contents of a backup.
    ///
    /// The rollback write itself is not backed up.
    pub async fn rollback(&self, filename: &str) -> Result<RoadmapState> {
        let bytes = self.inner.backups.read(filename).await?;
        let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
        let state = RoadmapState::normalise(&raw, self.inner.options.history_limit);
        tracing::info!(backup = %filename, "rolling back roadmap state");
        self.inner.write(state, WriteMode::WithoutBackup).await
    }

    /// All backups, most recent first.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.inner.backups.list().await
    }
}

impl StoreInner {
    async fn load(&self) -> Result<RoadmapState> {
        let state = match fs::read_to_string(&self.state_path).await {
            Ok(contents) => match serde_json::from_str::<serde_json::Value>(&contents) {
                Ok(raw) => RoadmapState::normalise(&raw, self.options.history_limit),
                Err(e) => {
                    tracing::error!(
                        path = %self.state_path.display(),
                        error = %e,
                        "roadmap state is corrupt, recreating defaults"
                    );
                    return self.write(RoadmapState::default(), WriteMode::WithBackup).await;
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.state_path.display(), "roadmap state missing, creating defaults");
                return self.write(RoadmapState::default(), WriteMode::WithoutBackup).await;
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let cycles = DependencyGraph::build(&state.milestones).find_cycles();
        if !cycles.is_empty() {
            tracing::warn!(milestones = ?cycles, "dependency cycle detected in roadmap");
        }

        *self.cache.write().await = Some(state.clone());
        Ok(state)
    }

    async fn write(&self, mut state: RoadmapState, mode: WriteMode) -> Result<RoadmapState> {
        state.renormalise(self.options.history_limit);
        state.last_updated = Some(Utc::now());
        let json = serde_json::to_string_pretty(&state)?;

        let lock = StateLock::acquire(&self.lock_path, self.options.lock).await?;
        let written = self.replace_file(json.as_bytes(), mode, lock.token()).await;
        let released = lock.release().await;
        written?;
        released?;

        if mode == WriteMode::WithBackup {
            self.backups.cleanup().await;
        }

        *self.cache.write().await = Some(state.clone());
        Ok(state)
    }

    /// Back up the current file if requested, then swap in `contents`.
    async fn replace_file(&self, contents: &[u8], mode: WriteMode, token: &str) -> Result<()> {
        if mode == WriteMode::WithBackup {
            match fs::read(&self.state_path).await {
                Ok(previous) => {
                    self.backups.create(&previous).await?;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = self.state_path.as_os_str().to_owned();
        tmp_name.push(format!(".{}.tmp", token));
        let tmp_path = PathBuf::from(tmp_name);

        if let Err(e) = fs::write(&tmp_path, contents).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.state_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl StateWriter for StoreInner {
    async fn write_batch(&self, factory: StateFactory) -> Result<Flushed> {
        let _guard = self.updates.lock().await;
        let cached = self.cache.read().await.clone();
        let current = self.load().await?;

        match factory(FlushInput {
            cached,
            current: current.clone(),
        }) {
            Some(next) => Ok(Flushed {
                state: self.write(next, WriteMode::WithBackup).await?,
                written: true,
                applied: true,
            }),
            None => Ok(Flushed {
                state: current,
                written: false,
                applied: true,
            }),
        }
    }
}

/// `<platform data dir>/keelson/<first 12 hex chars of sha256(repo path)>`.
pub fn hashed_storage_dir(repo_path: &Path) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;

    let repo_canonical = repo_path
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize repo path: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(repo_canonical.to_string_lossy().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());

    Ok(data_dir.join("keelson").join(&hash_hex[..12]))
}

/// Walk up from `start` looking for a `.git` entry.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}
