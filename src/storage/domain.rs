//! Domain loaders: where the engine reads tickets, features and modules from.
//!
//! The ticket/feature/module stores are owned elsewhere. The engine only
//! needs a point-in-time [`DomainSnapshot`], obtained through the
//! [`DomainLoader`] trait:
//! - `JsonDomainLoader` - reads the three JSON files the dashboard writes
//! - `StaticDomainLoader` - serves a fixed snapshot (request-scoped overrides, tests)

use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::models::domain::DomainSnapshot;

/// Source of the external entities milestones link to.
#[async_trait]
pub trait DomainLoader: Send + Sync {
    /// Load the current tickets, features and modules.
    async fn load_domain(&self) -> Result<DomainSnapshot>;

    /// Get the source description (for the state summary).
    fn source(&self) -> String;
}

/// Read and parse a JSON file, returning `fallback` when it does not exist.
pub async fn load_json(path: &Path, fallback: Value) -> Result<Value> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(fallback),
        Err(e) => Err(e.into()),
    }
}

/// Loads entities from `tickets.json`, `features.json` and `modules.json`.
#[derive(Debug, Clone)]
pub struct JsonDomainLoader {
    pub tickets_path: PathBuf,
    pub features_path: PathBuf,
    pub modules_path: PathBuf,
}

impl JsonDomainLoader {
    pub fn new(
        tickets_path: impl Into<PathBuf>,
        features_path: impl Into<PathBuf>,
        modules_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tickets_path: tickets_path.into(),
            features_path: features_path.into(),
            modules_path: modules_path.into(),
        }
    }
}

#[async_trait]
impl DomainLoader for JsonDomainLoader {
    async fn load_domain(&self) -> Result<DomainSnapshot> {
        let (tickets, features, modules) = tokio::try_join!(
            load_json(&self.tickets_path, Value::Array(Vec::new())),
            load_json(&self.features_path, Value::Array(Vec::new())),
            load_json(&self.modules_path, Value::Array(Vec::new())),
        )?;
        Ok(DomainSnapshot::from_values(&tickets, &features, &modules))
    }

    fn source(&self) -> String {
        "files".to_string()
    }
}

/// Serves a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticDomainLoader {
    snapshot: DomainSnapshot,
}

impl StaticDomainLoader {
    pub fn new(snapshot: DomainSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl DomainLoader for StaticDomainLoader {
    async fn load_domain(&self) -> Result<DomainSnapshot> {
        Ok(self.snapshot.clone())
    }

    fn source(&self) -> String {
        "static".to_string()
    }
}
