//! Common test utilities for keelson integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/keelson/` directory.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
pub use tempfile::TempDir;

use keelson::git::GitAutomation;
use keelson::models::domain::DomainSnapshot;
use keelson::roadmap::RoadmapEngine;
use keelson::storage::{LockOptions, StateStore, StaticDomainLoader, StoreOptions};

/// A test environment with isolated data storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `repo_dir`: Acts as the repository root
/// - `data_dir`: Holds the state file, backups and config (via `KEELSON_DATA_DIR`)
///
/// The `kl()` method returns a `Command` that sets `KEELSON_DATA_DIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub repo_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            repo_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the kl binary with isolated data directory.
    pub fn kl(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kl"));
        cmd.current_dir(self.repo_dir.path());
        cmd.env("KEELSON_DATA_DIR", self.data_dir.path());
        cmd.env_remove("KEELSON_REPO");
        cmd.env_remove("KEELSON_ACTOR");
        cmd.env_remove("KEELSON_LOG");
        cmd
    }

    /// Get the path to the repo directory.
    pub fn path(&self) -> &Path {
        self.repo_dir.path()
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    /// Path of the live state file.
    pub fn state_path(&self) -> std::path::PathBuf {
        self.data_path().join("roadmap-state.json")
    }

    /// Write config.kdl into the data directory.
    pub fn write_config(&self, kdl: &str) {
        std::fs::write(self.data_path().join("config.kdl"), kdl).unwrap();
    }

    /// Write one of the domain source files into the data directory.
    pub fn write_domain_file(&self, name: &str, json: &str) {
        std::fs::write(self.data_path().join(name), json).unwrap();
    }

    /// Store options with short lock and debounce delays.
    pub fn fast_options(&self) -> StoreOptions {
        StoreOptions {
            lock: LockOptions {
                attempts: 3,
                base_delay: Duration::from_millis(5),
            },
            save_debounce: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Open a fresh store over this environment's data directory.
    pub fn store(&self) -> Arc<StateStore> {
        Arc::new(StateStore::open_in(self.data_path(), self.fast_options()))
    }

    /// Engine with a fixed domain snapshot and the given git collaborator.
    pub fn engine(&self, domain: DomainSnapshot, git: Arc<dyn GitAutomation>) -> RoadmapEngine {
        RoadmapEngine::new(self.store(), Arc::new(StaticDomainLoader::new(domain)), git)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
