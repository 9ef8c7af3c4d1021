//! Cross-process lockfile around state writes.
//!
//! The lock is a sibling file (`<state-path>.lock`) created exclusively and
//! holding a random 32-hex-char token. Contention is resolved by retrying with
//! exponential backoff; release only unlinks the file if it still holds our
//! token. This is best-effort mutual exclusion, not a fencing scheme: a holder
//! that crashes leaves the file behind until someone removes it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Retry policy for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Total number of attempts before giving up
    pub attempts: u32,
    /// Delay after the first failed attempt; doubles each retry
    pub base_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl LockOptions {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// A held state lock.
///
/// Call [`StateLock::release`] when done. Dropping an unreleased lock falls
/// back to a synchronous token-checked removal.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    token: String,
    released: bool,
}

impl StateLock {
    /// Path of the lockfile guarding `state_path`.
    pub fn path_for(state_path: &Path) -> PathBuf {
        let mut name = state_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Acquire the lock at `path`, retrying while another holder has it.
    pub async fn acquire(path: &Path, options: LockOptions) -> Result<Self> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        for attempt in 0..options.attempts {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(file) => {
                    write_token(path, file, &token).await?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt + 1 < options.attempts {
                        let delay = options.backoff(attempt);
                        tracing::debug!(
                            path = %path.display(),
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "state lock busy, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        tracing::warn!(path = %path.display(), attempts = options.attempts, "gave up acquiring state lock");
        Err(Error::LockUnavailable)
    }

    /// The token written into the lockfile.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the path to the lockfile.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the lockfile if it still holds our token.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim() == self.token => {
                match fs::remove_file(&self.path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(Error::Io(e)),
                }
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "state lock token changed, leaving lockfile in place");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Fill a freshly created lockfile, unlinking it if the token can't be written.
async fn write_token<W: AsyncWrite + Unpin>(path: &Path, mut file: W, token: &str) -> Result<()> {
    let written = match file.write_all(token.as_bytes()).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %cleanup, "could not remove half-written lockfile");
        }
        return Err(Error::Io(e));
    }
    Ok(())
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(contents) = std::fs::read_to_string(&self.path) {
            if contents.trim() == self.token {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}
