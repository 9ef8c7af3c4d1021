//! Normalized shapes of the external entities milestones link to.
//!
//! Tickets, features and modules are owned by other stores. The engine only
//! reads them, so all it keeps is the id and the fields that decide whether
//! an entity counts as done, outstanding, or blocked.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::canonical_id;

/// Kind of linked entity. Each kind carries its own completion weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Ticket,
    Feature,
    Module,
}

impl EntityKind {
    /// Weight this kind contributes to weighted milestone progress.
    pub fn weight(&self) -> u32 {
        match self {
            EntityKind::Ticket => 1,
            EntityKind::Feature => 3,
            EntityKind::Module => 5,
        }
    }

    /// Key used when the source file wraps its array in an object.
    fn wrapper_key(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "tickets",
            EntityKind::Feature => "features",
            EntityKind::Module => "modules",
        }
    }
}

/// How a linked entity counts toward milestone progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityProgress {
    Complete,
    Incomplete,
    /// The entity itself is blocked or paused
    Blocked,
}

/// A ticket, feature or module reduced to what the engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntity {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Modules only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl DomainEntity {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Some(status.into()),
            health: None,
        }
    }

    /// Set module health.
    pub fn with_health(mut self, health: impl Into<String>) -> Self {
        self.health = Some(health.into());
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(canonical_id)?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
        };
        Some(Self {
            id,
            status: text("status"),
            health: text("health"),
        })
    }

    /// Resolve this entity's contribution for the given kind.
    pub fn progress(&self, kind: EntityKind) -> EntityProgress {
        let status = self.status.as_deref().unwrap_or("").to_lowercase();
        let health = self.health.as_deref().unwrap_or("").to_lowercase();

        if matches!(status.as_str(), "blocked" | "paused")
            || (kind == EntityKind::Module && matches!(health.as_str(), "blocked" | "paused"))
        {
            return EntityProgress::Blocked;
        }

        let complete = match kind {
            EntityKind::Ticket => matches!(status.as_str(), "done" | "completed" | "closed" | "resolved"),
            EntityKind::Feature => {
                matches!(status.as_str(), "done" | "completed" | "shipped" | "released")
            }
            EntityKind::Module => {
                matches!(status.as_str(), "done" | "completed")
                    || matches!(health.as_str(), "healthy" | "stable" | "complete" | "completed")
            }
        };

        if complete {
            EntityProgress::Complete
        } else {
            EntityProgress::Incomplete
        }
    }
}

/// Point-in-time view of all tickets, features and modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    #[serde(default)]
    pub tickets: Vec<DomainEntity>,
    #[serde(default)]
    pub features: Vec<DomainEntity>,
    #[serde(default)]
    pub modules: Vec<DomainEntity>,
}

impl DomainSnapshot {
    /// Build from raw source documents, each either a bare array or an
    /// object wrapping one (`{"tickets": [...]}` or `{"items": [...]}`).
    pub fn from_values(tickets: &Value, features: &Value, modules: &Value) -> Self {
        Self {
            tickets: entities(tickets, EntityKind::Ticket),
            features: entities(features, EntityKind::Feature),
            modules: entities(modules, EntityKind::Module),
        }
    }

    /// Index entities by kind and canonical id for lookups during progress calculation.
    pub fn index(&self) -> DomainIndex<'_> {
        let mut by_kind: HashMap<EntityKind, HashMap<&str, &DomainEntity>> = HashMap::new();
        for (kind, list) in [
            (EntityKind::Ticket, &self.tickets),
            (EntityKind::Feature, &self.features),
            (EntityKind::Module, &self.modules),
        ] {
            let ids = by_kind.entry(kind).or_default();
            for entity in list {
                ids.insert(entity.id.as_str(), entity);
            }
        }
        DomainIndex { by_kind }
    }
}

/// Lookup table over a [`DomainSnapshot`].
#[derive(Debug, Default)]
pub struct DomainIndex<'a> {
    by_kind: HashMap<EntityKind, HashMap<&'a str, &'a DomainEntity>>,
}

impl DomainIndex<'_> {
    /// Resolve a linked id. Unknown ids count as incomplete.
    pub fn resolve(&self, kind: EntityKind, id: &str) -> EntityProgress {
        match self.by_kind.get(&kind).and_then(|ids| ids.get(id)) {
            Some(entity) => entity.progress(kind),
            None => EntityProgress::Incomplete,
        }
    }
}

fn entities(source: &Value, kind: EntityKind) -> Vec<DomainEntity> {
    let items = match source {
        Value::Array(items) => Some(items),
        Value::Object(obj) => obj
            .get(kind.wrapper_key())
            .or_else(|| obj.get("items"))
            .and_then(Value::as_array),
        _ => None,
    };
    items
        .map(|items| items.iter().filter_map(DomainEntity::from_value).collect())
        .unwrap_or_default()
}
