//! Data models for the roadmap state engine.
//!
//! This module defines the core data structures:
//! - `Milestone` - Roadmap node with status, progress, dependency and link edges
//! - `DependencySummary` - Derived view of a milestone's dependencies
//! - `RoadmapState` - The persisted document (milestones, history, summary)
//! - `HistoryEntry` / `MilestoneChange` - Structured change log
//! - `MilestonePatch` - Partial update request, sanitized into `MilestoneUpdate`
//!
//! The on-disk format uses camelCase keys. Loading goes through
//! [`RoadmapState::normalise`], which tolerates the loose shapes produced by
//! older writers (milestones as an array, numeric ids, unknown statuses).

pub mod domain;
pub mod graph;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Current schema version written to the state file.
pub const STATE_VERSION: u32 = 1;

/// Maximum number of history entries kept in the state file.
pub const DEFAULT_HISTORY_LIMIT: usize = 25;

/// Roadmap milestone status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadmapStatus {
    #[default]
    Pending,
    Active,
    Paused,
    Blocked,
    /// Terminal: no transition leaves this state
    Completed,
}

impl RoadmapStatus {
    /// Parse a status string, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "blocked" => Ok(Self::Blocked),
            "completed" => Ok(Self::Completed),
            _ => Err(Error::UnknownStatus(raw.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
        }
    }

    /// Blocked and paused milestones make no progress.
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Blocked | Self::Paused)
    }

    /// Get all statuses.
    pub fn all() -> &'static [RoadmapStatus] {
        &[
            Self::Pending,
            Self::Active,
            Self::Paused,
            Self::Blocked,
            Self::Completed,
        ]
    }
}

impl fmt::Display for RoadmapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RoadmapStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Overall state of a milestone's dependencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    /// No dependencies, or all of them completed
    #[default]
    Clear,
    /// Some dependency incomplete or missing, none blocked
    Pending,
    /// At least one dependency blocked or paused
    Blocked,
}

/// Classification of a single dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyState {
    Missing,
    Blocked,
    Completed,
    Pending,
}

/// One row of a dependency summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyItem {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub state: DependencyState,

    /// Progress the dependency contributes to gating (missing counts as 0)
    pub progress: u8,
}

/// Derived view of a milestone's dependencies. Never authored directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySummary {
    pub status: GateStatus,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub blocked: usize,
    pub missing: usize,

    /// Minimum progress across all dependencies (100 when there are none)
    pub gating_progress: u8,

    #[serde(default)]
    pub items: Vec<DependencyItem>,
}

/// A roadmap milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    /// Canonical string identifier
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: RoadmapStatus,

    /// Completion percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Milestone ids this milestone depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub linked_tickets: Vec<String>,

    #[serde(default)]
    pub linked_features: Vec<String>,

    #[serde(default)]
    pub linked_modules: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_summary: Option<DependencySummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<String>,

    /// Authored keys the engine does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keys owned by [`Milestone`]'s typed fields.
const MILESTONE_KEYS: &[&str] = &[
    "id",
    "title",
    "description",
    "status",
    "progress",
    "dependencies",
    "linkedTickets",
    "linkedFeatures",
    "linkedModules",
    "dependencySummary",
    "completionSummary",
    "completedAt",
    "updatedAt",
    "lastEditedBy",
];

impl Milestone {
    /// Create a new pending milestone with the given ID and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: RoadmapStatus::default(),
            progress: 0,
            dependencies: Vec::new(),
            linked_tickets: Vec::new(),
            linked_features: Vec::new(),
            linked_modules: Vec::new(),
            dependency_summary: None,
            completion_summary: None,
            completed_at: None,
            updated_at: None,
            last_edited_by: None,
            extra: Map::new(),
        }
    }

    /// True when the milestone links to no tickets, features or modules.
    pub fn has_links(&self) -> bool {
        !(self.linked_tickets.is_empty()
            && self.linked_features.is_empty()
            && self.linked_modules.is_empty())
    }

    /// Build a milestone from a loosely-shaped JSON object.
    ///
    /// Returns `None` when no usable id can be found. `fallback_id` is used
    /// when the object itself carries no id (map-keyed storage).
    fn from_loose(value: &Value, fallback_id: Option<&str>) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj
            .get("id")
            .and_then(canonical_id)
            .or_else(|| fallback_id.map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())?;

        let mut milestone = Milestone::new(id.clone(), string_field(obj, "title").unwrap_or(id));
        milestone.description = string_field(obj, "description");
        milestone.status = obj
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| RoadmapStatus::parse(s).ok())
            .unwrap_or_default();
        milestone.progress = obj.get("progress").map(clamp_progress_value).unwrap_or(0);
        milestone.dependencies = id_list(obj.get("dependencies"));
        milestone.linked_tickets = id_list(obj.get("linkedTickets"));
        milestone.linked_features = id_list(obj.get("linkedFeatures"));
        milestone.linked_modules = id_list(obj.get("linkedModules"));
        milestone.dependency_summary = obj
            .get("dependencySummary")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        milestone.completion_summary = string_field(obj, "completionSummary");
        milestone.completed_at = timestamp_field(obj, "completedAt");
        milestone.updated_at = timestamp_field(obj, "updatedAt");
        milestone.last_edited_by = string_field(obj, "lastEditedBy");
        milestone.extra = obj
            .iter()
            .filter(|(key, _)| !MILESTONE_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        // A milestone never depends on itself
        let own_id = milestone.id.clone();
        milestone.dependencies.retain(|dep| *dep != own_id);

        Some(milestone)
    }
}

/// Aggregate counts describing where the roadmap was last derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapSummary {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub ticket_count: usize,
    #[serde(default)]
    pub module_count: usize,
    #[serde(default)]
    pub feature_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Before/after pair for a single changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Value,
    pub to: Value,
}

/// Structured diff of one milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneChange {
    pub id: String,

    pub title: String,

    /// Changed fields keyed by their camelCase name
    pub fields: BTreeMap<String, FieldChange>,

    pub updated_at: DateTime<Utc>,

    /// Set only for manual edits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// True when produced by dependency propagation rather than a direct edit
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cascade: bool,

    /// True when the milestone disappeared from the state (never pruned)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
}

/// One entry of the bounded change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub changes: Vec<MilestoneChange>,
}

/// The persisted roadmap document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapState {
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Milestones keyed by canonical id
    #[serde(default)]
    pub milestones: BTreeMap<String, Milestone>,

    /// Most recent first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    #[serde(default)]
    pub summary: RoadmapSummary,
}

impl Default for RoadmapState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_updated: None,
            milestones: BTreeMap::new(),
            history: Vec::new(),
            summary: RoadmapSummary {
                source: "default".to_string(),
                ..Default::default()
            },
        }
    }
}

impl RoadmapState {
    /// Normalise a loosely-shaped JSON document into a state.
    ///
    /// Fills defaults, accepts milestones as either a map or an array, clamps
    /// status and progress, drops unparseable history and truncates it.
    pub fn normalise(value: &Value, history_limit: usize) -> Self {
        let mut state = RoadmapState::default();
        let Some(obj) = value.as_object() else {
            return state;
        };

        if let Some(version) = obj.get("version").and_then(Value::as_u64) {
            state.version = u32::try_from(version).unwrap_or(STATE_VERSION);
        }
        state.last_updated = timestamp_field(obj, "lastUpdated");

        match obj.get("milestones") {
            Some(Value::Object(map)) => {
                for (key, raw) in map {
                    if let Some(m) = Milestone::from_loose(raw, Some(key)) {
                        state.milestones.insert(m.id.clone(), m);
                    }
                }
            }
            Some(Value::Array(items)) => {
                for raw in items {
                    if let Some(m) = Milestone::from_loose(raw, None) {
                        state.milestones.insert(m.id.clone(), m);
                    }
                }
            }
            _ => {}
        }

        if let Some(Value::Array(entries)) = obj.get("history") {
            state.history = entries
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect();
        }
        state.history.truncate(history_limit);

        if let Some(summary) = obj.get("summary") {
            if let Ok(parsed) = serde_json::from_value(summary.clone()) {
                state.summary = parsed;
            }
        }

        state
    }

    /// Re-apply the normalisation invariants to an already typed state.
    pub fn renormalise(&mut self, history_limit: usize) {
        let milestones = std::mem::take(&mut self.milestones);
        for (_, mut milestone) in milestones {
            milestone.progress = milestone.progress.min(100);
            let own_id = milestone.id.clone();
            dedupe(&mut milestone.dependencies);
            milestone.dependencies.retain(|dep| *dep != own_id);
            dedupe(&mut milestone.linked_tickets);
            dedupe(&mut milestone.linked_features);
            dedupe(&mut milestone.linked_modules);
            self.milestones.insert(milestone.id.clone(), milestone);
        }
        self.history.truncate(history_limit);
    }

    /// Prepend a history entry and enforce the length bound.
    pub fn record_history(&mut self, entry: HistoryEntry, history_limit: usize) {
        self.history.insert(0, entry);
        self.history.truncate(history_limit);
    }
}

/// Partial update for a single milestone.
///
/// Every field is optional; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_tickets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_modules: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_summary: Option<String>,
}

impl MilestonePatch {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.progress.is_none()
            && self.dependencies.is_none()
            && self.linked_tickets.is_none()
            && self.linked_features.is_none()
            && self.linked_modules.is_none()
            && self.completion_summary.is_none()
    }

    /// Validate field by field: clamp progress, dedupe id lists, parse status.
    pub fn sanitize(self) -> Result<MilestoneUpdate> {
        if self.is_empty() {
            return Err(Error::NoUpdates);
        }

        let status = self.status.as_deref().map(RoadmapStatus::parse).transpose()?;
        let clean_ids = |ids: Option<Vec<String>>| {
            ids.map(|ids| {
                let mut ids: Vec<String> = ids
                    .into_iter()
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect();
                dedupe(&mut ids);
                ids
            })
        };

        Ok(MilestoneUpdate {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description,
            status,
            progress: self.progress.map(|p| p.clamp(0, 100) as u8),
            dependencies: clean_ids(self.dependencies),
            linked_tickets: clean_ids(self.linked_tickets),
            linked_features: clean_ids(self.linked_features),
            linked_modules: clean_ids(self.linked_modules),
            completion_summary: self.completion_summary,
        })
    }
}

/// A sanitized [`MilestonePatch`], ready to merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilestoneUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<RoadmapStatus>,
    pub progress: Option<u8>,
    pub dependencies: Option<Vec<String>>,
    pub linked_tickets: Option<Vec<String>>,
    pub linked_features: Option<Vec<String>>,
    pub linked_modules: Option<Vec<String>>,
    pub completion_summary: Option<String>,
}

impl MilestoneUpdate {
    /// camelCase names of the fields this update touches.
    pub fn requested_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.progress.is_some() {
            fields.push("progress");
        }
        if self.dependencies.is_some() {
            fields.push("dependencies");
        }
        if self.linked_tickets.is_some() {
            fields.push("linkedTickets");
        }
        if self.linked_features.is_some() {
            fields.push("linkedFeatures");
        }
        if self.linked_modules.is_some() {
            fields.push("linkedModules");
        }
        if self.completion_summary.is_some() {
            fields.push("completionSummary");
        }
        fields
    }

    /// Merge into a copy of `milestone`.
    pub fn apply_to(&self, milestone: &Milestone) -> Milestone {
        let mut next = milestone.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(description) = &self.description {
            next.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(progress) = self.progress {
            next.progress = progress;
        }
        if let Some(deps) = &self.dependencies {
            next.dependencies = deps.iter().filter(|d| **d != next.id).cloned().collect();
        }
        if let Some(tickets) = &self.linked_tickets {
            next.linked_tickets = tickets.clone();
        }
        if let Some(features) = &self.linked_features {
            next.linked_features = features.clone();
        }
        if let Some(modules) = &self.linked_modules {
            next.linked_modules = modules.clone();
        }
        if let Some(summary) = &self.completion_summary {
            next.completion_summary = Some(summary.clone());
        }
        next
    }
}

/// Canonical string form of an id that may be stored as a string or number.
pub fn canonical_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

/// Remove duplicates while keeping first-seen order.
pub fn dedupe(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

fn id_list(value: Option<&Value>) -> Vec<String> {
    let mut ids: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(canonical_id).collect(),
        _ => Vec::new(),
    };
    dedupe(&mut ids);
    ids
}

fn clamp_progress_value(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    raw.round().clamp(0.0, 100.0) as u8
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn timestamp_field(obj: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    obj.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
}
