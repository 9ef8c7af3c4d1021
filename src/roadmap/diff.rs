//! Field-level milestone diffs and history entries.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{FieldChange, HistoryEntry, Milestone, MilestoneChange};

/// Fields compared on every update, whether or not they were requested.
pub const TRACKED_FIELDS: [&str; 6] = [
    "progress",
    "status",
    "dependencies",
    "dependencySummary",
    "completionSummary",
    "completedAt",
];

/// Serialized value of one camelCase field (`Null` when absent).
pub fn field_value(milestone: &Milestone, field: &str) -> Value {
    match serde_json::to_value(milestone) {
        Ok(Value::Object(mut map)) => map.remove(field).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Requested fields plus the tracked set, keeping only those whose
/// serialized values differ between `previous` and `next`.
pub fn compute_changed_fields(
    previous: &Milestone,
    next: &Milestone,
    requested: &[&str],
) -> Vec<String> {
    let before = to_map(previous);
    let after = to_map(next);

    let mut fields: Vec<String> = Vec::new();
    for field in requested.iter().copied().chain(TRACKED_FIELDS) {
        if fields.iter().any(|f| f == field) {
            continue;
        }
        let from = before.get(field).unwrap_or(&Value::Null);
        let to = after.get(field).unwrap_or(&Value::Null);
        if from != to {
            fields.push(field.to_string());
        }
    }
    fields
}

/// Build the structured diff for `fields`.
pub fn diff_milestone(
    previous: &Milestone,
    next: &Milestone,
    fields: &[String],
    actor: Option<&str>,
    cascade: bool,
    timestamp: DateTime<Utc>,
) -> MilestoneChange {
    let before = to_map(previous);
    let after = to_map(next);

    let changes = fields
        .iter()
        .map(|field| {
            (
                field.clone(),
                FieldChange {
                    from: before.get(field).cloned().unwrap_or(Value::Null),
                    to: after.get(field).cloned().unwrap_or(Value::Null),
                },
            )
        })
        .collect();

    MilestoneChange {
        id: next.id.clone(),
        title: next.title.clone(),
        fields: changes,
        updated_at: timestamp,
        actor: actor.map(str::to_string),
        cascade,
        removed: false,
    }
}

/// Diff two whole milestone maps on the tracked fields.
///
/// Milestones present only in `previous` are reported with `removed: true`.
/// New milestones diff against an empty milestone with the same id.
pub fn diff_states(
    previous: &BTreeMap<String, Milestone>,
    next: &BTreeMap<String, Milestone>,
    timestamp: DateTime<Utc>,
) -> Vec<MilestoneChange> {
    let mut changes = Vec::new();

    for (id, after) in next {
        let blank;
        let before = match previous.get(id) {
            Some(before) => before,
            None => {
                blank = Milestone::new(id.clone(), after.title.clone());
                &blank
            }
        };
        let fields = compute_changed_fields(before, after, &[]);
        if !fields.is_empty() {
            changes.push(diff_milestone(before, after, &fields, None, false, timestamp));
        }
    }

    for (id, before) in previous {
        if !next.contains_key(id) {
            changes.push(MilestoneChange {
                id: id.clone(),
                title: before.title.clone(),
                fields: BTreeMap::new(),
                updated_at: timestamp,
                actor: None,
                cascade: false,
                removed: true,
            });
        }
    }

    changes
}

/// Human summary line for a history entry.
pub fn summarize_changes(changes: &[MilestoneChange]) -> String {
    let direct: Vec<&str> = changes
        .iter()
        .filter(|c| !c.cascade && !c.removed)
        .map(|c| c.id.as_str())
        .collect();
    let cascaded = changes.iter().filter(|c| c.cascade).count();
    let removed = changes.iter().filter(|c| c.removed).count();

    let mut parts = Vec::new();
    if !direct.is_empty() {
        parts.push(format!("Updated {}", direct.join(", ")));
    }
    if cascaded > 0 {
        parts.push(format!(
            "{} dependent milestone{} recalculated",
            cascaded,
            if cascaded == 1 { "" } else { "s" }
        ));
    }
    if removed > 0 {
        parts.push(format!("{} removed", removed));
    }
    if parts.is_empty() {
        "No changes".to_string()
    } else {
        parts.join("; ")
    }
}

/// Assemble one history entry for a batch of changes.
pub fn build_history_entry(
    reason: &str,
    actor: Option<&str>,
    changes: Vec<MilestoneChange>,
    timestamp: DateTime<Utc>,
) -> HistoryEntry {
    HistoryEntry {
        reason: reason.to_string(),
        timestamp,
        actor: actor.map(str::to_string),
        summary: summarize_changes(&changes),
        changes,
    }
}

fn to_map(milestone: &Milestone) -> serde_json::Map<String, Value> {
    match serde_json::to_value(milestone) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
