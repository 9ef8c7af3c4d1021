//! Timestamped backups of the state file.
//!
//! Before each backed-up write, the previous file contents are copied to
//! `backups/roadmap-state-<timestamp>.json`. After the write, retention keeps
//! the `max_backups` most recently modified backups and gzips any plaintext
//! backup older than `compress_after`. Compaction problems are logged and
//! never fail the write that triggered them.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;

use crate::{Error, Result};

/// Filename prefix shared by every backup.
pub const BACKUP_PREFIX: &str = "roadmap-state-";

/// Retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupRetention {
    pub max_backups: usize,
    pub compress_after: Duration,
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            max_backups: 5,
            compress_after: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub filename: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub compressed: bool,
}

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub pruned: Vec<String>,
    pub compressed: Vec<String>,
}

/// Manages the backup directory next to the state file.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    retention: BackupRetention,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, retention: BackupRetention) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    /// Get the backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `contents` as a new backup and return its path.
    pub async fn create(&self, contents: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%6fZ").to_string();
        let mut path = self.dir.join(format!("{}{}.json", BACKUP_PREFIX, stamp));
        let mut suffix = 1;
        while fs::try_exists(&path).await? || fs::try_exists(gz_path(&path)).await? {
            path = self
                .dir
                .join(format!("{}{}-{}.json", BACKUP_PREFIX, stamp, suffix));
            suffix += 1;
        }

        fs::write(&path, contents).await?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), "created state backup");
        Ok(path)
    }

    /// All backups, most recently modified first.
    pub async fn list(&self) -> Result<Vec<BackupInfo>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(Error::Io(e)),
        };

        while let Some(entry) = dir.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !is_backup_name(&filename) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(BackupInfo {
                compressed: filename.ends_with(".gz"),
                filename,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        // Newest first; names embed the timestamp, so they break mtime ties
        entries.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(entries)
    }

    /// Prune beyond the retention count, then compress aged plaintext backups.
    ///
    /// Never fails: problems are logged and the affected file is left as is.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let backups = match self.list().await {
            Ok(backups) => backups,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "could not list backups");
                return report;
            }
        };

        let (keep, prune) = backups.split_at(backups.len().min(self.retention.max_backups));
        for backup in prune {
            let path = self.dir.join(&backup.filename);
            match fs::remove_file(&path).await {
                Ok(()) => report.pruned.push(backup.filename.clone()),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not prune backup")
                }
            }
        }
        if !report.pruned.is_empty() {
            tracing::info!(count = report.pruned.len(), "pruned old state backups");
        }

        let now = Utc::now();
        let max_age = chrono::Duration::from_std(self.retention.compress_after)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        for backup in keep {
            if backup.compressed || now.signed_duration_since(backup.modified) <= max_age {
                continue;
            }
            let path = self.dir.join(&backup.filename);
            match compress_file(&path).await {
                Ok(gz) => {
                    tracing::debug!(path = %gz.display(), "compressed aged backup");
                    report.compressed.push(backup.filename.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "backup compression failed, keeping plaintext")
                }
            }
        }

        report
    }

    /// Read a backup by filename, decompressing `.gz` backups.
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        if filename.contains(['/', '\\']) || filename.contains("..") || !is_backup_name(filename) {
            return Err(Error::BackupNotFound(filename.to_string()));
        }
        let path = self.dir.join(filename);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::BackupNotFound(filename.to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if filename.ends_with(".gz") {
            let decoded = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
                let mut decoder = GzDecoder::new(&bytes[..]);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            })
            .await
            .map_err(|e| Error::Other(format!("Backup decompression task failed: {}", e)))??;
            Ok(decoded)
        } else {
            Ok(bytes)
        }
    }
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && (name.ends_with(".json") || name.ends_with(".json.gz"))
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzip `path` to `<path>.gz` and remove the plaintext once the archive is written.
async fn compress_file(path: &Path) -> io::Result<PathBuf> {
    let plain = fs::read(path).await?;
    let gz = gz_path(path);

    let compressed = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(plain.len() / 2), Compression::default());
        encoder.write_all(&plain)?;
        encoder.finish()
    })
    .await
    .map_err(io::Error::other)??;

    fs::write(&gz, compressed).await?;
    fs::remove_file(path).await?;
    Ok(gz)
}
