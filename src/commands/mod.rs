//! Command implementations for the keelson CLI.
//!
//! Each command returns a value implementing [`Output`], which `main`
//! prints as JSON (default) or human-readable text (`-H`).

use serde::Serialize;
use std::sync::Arc;

use crate::config::ResolvedSettings;
use crate::git::{DisabledGitAutomation, GitAutomation, GitCli};
use crate::models::{HistoryEntry, Milestone, MilestonePatch, RoadmapState, RoadmapStatus};
use crate::roadmap::{RoadmapEngine, SyncOptions, SyncResult, UpdateOptions, UpdateResult};
use crate::storage::{BackupInfo, JsonDomainLoader, StateStore};
use crate::Result;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Wire up an engine from resolved settings.
pub fn build_engine(settings: &ResolvedSettings) -> RoadmapEngine {
    let store = Arc::new(StateStore::new(
        settings.state_file.value.clone(),
        settings.store_options(),
    ));
    let loader = Arc::new(JsonDomainLoader::new(
        settings.tickets_file.value.clone(),
        settings.features_file.value.clone(),
        settings.modules_file.value.clone(),
    ));
    let git: Arc<dyn GitAutomation> = if settings.git_automation.value {
        Arc::new(GitCli::new(
            settings.repo_path.value.clone(),
            settings.state_file.value.clone(),
        ))
    } else {
        Arc::new(DisabledGitAutomation)
    };
    RoadmapEngine::new(store, loader, git)
}

fn milestone_line(m: &Milestone) -> String {
    let mut line = format!("{} [{}] {:>3}% {}", m.id, m.status, m.progress, m.title);
    if !m.dependencies.is_empty() {
        line.push_str(&format!(" (depends on: {})", m.dependencies.join(", ")));
    }
    line
}

fn milestone_detail(m: &Milestone) -> String {
    let mut lines = vec![
        format!("{}: {}", m.id, m.title),
        format!("  Status: {}", m.status),
        format!("  Progress: {}%", m.progress),
    ];
    if let Some(description) = &m.description {
        lines.push(format!("  Description: {}", description));
    }
    if let Some(summary) = &m.dependency_summary {
        lines.push(format!(
            "  Dependencies: {} ({}/{} complete, gate {}%)",
            serde_json::to_value(summary.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            summary.completed,
            summary.total,
            summary.gating_progress
        ));
    }
    for (label, ids) in [
        ("Tickets", &m.linked_tickets),
        ("Features", &m.linked_features),
        ("Modules", &m.linked_modules),
    ] {
        if !ids.is_empty() {
            lines.push(format!("  {}: {}", label, ids.join(", ")));
        }
    }
    if let Some(summary) = &m.completion_summary {
        lines.push(format!("  Completion: {}", summary));
    }
    if let Some(at) = m.completed_at {
        lines.push(format!("  Completed at: {}", at.to_rfc3339()));
    }
    lines.join("\n")
}

// === show ===

/// Result of `kl show`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ShowResult {
    Roadmap(RoadmapState),
    Milestone(Milestone),
}

impl Output for ShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match self {
            ShowResult::Milestone(m) => milestone_detail(m),
            ShowResult::Roadmap(state) => {
                if state.milestones.is_empty() {
                    return "No milestones.".to_string();
                }
                let mut lines = vec![format!("{} milestone(s):", state.milestones.len())];
                lines.extend(state.milestones.values().map(|m| format!("  {}", milestone_line(m))));
                lines.join("\n")
            }
        }
    }
}

/// Show the whole roadmap or a single milestone.
pub async fn show(engine: &RoadmapEngine, id: Option<&str>) -> Result<ShowResult> {
    match id {
        Some(id) => Ok(ShowResult::Milestone(engine.milestone(id).await?)),
        None => Ok(ShowResult::Roadmap(engine.state().await?)),
    }
}

// === milestone add / update ===

/// Fields accepted by `kl milestone add`.
#[derive(Debug, Clone, Default)]
pub struct MilestoneDraft {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub dependencies: Vec<String>,
    pub tickets: Vec<String>,
    pub features: Vec<String>,
    pub modules: Vec<String>,
    pub actor: Option<String>,
}

/// Add a milestone.
pub async fn milestone_add(engine: &RoadmapEngine, draft: MilestoneDraft) -> Result<UpdateResult> {
    let mut milestone = Milestone::new(draft.id, draft.title);
    milestone.description = draft.description;
    if let Some(status) = draft.status.as_deref() {
        milestone.status = RoadmapStatus::parse(status)?;
    }
    milestone.progress = draft.progress.map(|p| p.clamp(0, 100) as u8).unwrap_or(0);
    milestone.dependencies = draft.dependencies;
    milestone.linked_tickets = draft.tickets;
    milestone.linked_features = draft.features;
    milestone.linked_modules = draft.modules;

    let options = UpdateOptions {
        reason: "roadmap:manual:add".to_string(),
        actor: draft.actor,
        skip_git_automation: true,
        domain_override: None,
    };
    engine.insert_milestone(milestone, options).await
}

/// Apply a partial update to a milestone.
pub async fn milestone_update(
    engine: &RoadmapEngine,
    id: &str,
    patch: MilestonePatch,
    options: UpdateOptions,
) -> Result<UpdateResult> {
    engine.update_milestone(id, patch, options).await
}

impl Output for UpdateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if !self.changed {
            return format!("No changes to {}.", self.milestone.id);
        }
        let mut lines = Vec::new();
        for change in &self.changes {
            let fields: Vec<String> = change
                .fields
                .iter()
                .filter(|(name, _)| name.as_str() != "dependencySummary")
                .map(|(name, diff)| format!("{}: {} -> {}", name, diff.from, diff.to))
                .collect();
            let prefix = if change.cascade { "  cascade " } else { "Updated " };
            if fields.is_empty() {
                lines.push(format!("{}{}", prefix, change.id));
            } else {
                lines.push(format!("{}{} ({})", prefix, change.id, fields.join(", ")));
            }
        }
        if let Some(git) = &self.git_automation {
            match (&git.commit, &git.reason) {
                (Some(commit), _) => lines.push(format!("Committed {}", commit)),
                (None, Some(reason)) => lines.push(format!("Git automation skipped: {}", reason)),
                (None, None) => {}
            }
        }
        lines.join("\n")
    }
}

// === sync ===

/// Re-derive the roadmap from the domain files.
pub async fn sync(engine: &RoadmapEngine, reason: &str, debounced: bool) -> Result<SyncResult> {
    let options = SyncOptions {
        reason: reason.to_string(),
        ..Default::default()
    };
    if debounced {
        engine.sync(options).await
    } else {
        engine.sync_now(options).await
    }
}

impl Output for SyncResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if !self.changed {
            return "Roadmap already up to date.".to_string();
        }
        let mut lines = vec![format!("Synced {} milestone change(s):", self.changes.len())];
        for change in &self.changes {
            if change.removed {
                lines.push(format!("  {} (removed)", change.id));
            } else {
                let fields: Vec<&str> = change.fields.keys().map(String::as_str).collect();
                lines.push(format!("  {} ({})", change.id, fields.join(", ")));
            }
        }
        lines.join("\n")
    }
}

// === history ===

/// Result of `kl history`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub entries: Vec<HistoryEntry>,
}

impl Output for HistoryView {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No history.".to_string();
        }
        self.entries
            .iter()
            .map(|entry| {
                let actor = entry
                    .actor
                    .as_deref()
                    .map(|a| format!(" by {}", a))
                    .unwrap_or_default();
                format!(
                    "{} {}{}: {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.reason,
                    actor,
                    entry.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Most recent history entries.
pub async fn history(engine: &RoadmapEngine, limit: Option<usize>) -> Result<HistoryView> {
    let mut entries = engine.state().await?.history;
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    Ok(HistoryView { entries })
}

// === backups ===

/// Result of `kl backup list`.
#[derive(Debug, Clone, Serialize)]
pub struct BackupList {
    pub backups: Vec<BackupInfo>,
}

impl Output for BackupList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.backups.is_empty() {
            return "No backups.".to_string();
        }
        self.backups
            .iter()
            .map(|b| {
                format!(
                    "{}  {:>8} bytes  {}{}",
                    b.filename,
                    b.size,
                    b.modified.format("%Y-%m-%d %H:%M:%S"),
                    if b.compressed { "  (gzip)" } else { "" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn backup_list(engine: &RoadmapEngine) -> Result<BackupList> {
    Ok(BackupList {
        backups: engine.list_backups().await?,
    })
}

/// Result of `kl backup rollback`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub restored_from: String,
    pub state: RoadmapState,
}

impl Output for RollbackResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Restored {} milestone(s) from {}.",
            self.state.milestones.len(),
            self.restored_from
        )
    }
}

pub async fn backup_rollback(
    engine: &RoadmapEngine,
    filename: &str,
    actor: Option<&str>,
) -> Result<RollbackResult> {
    let state = engine.rollback(filename, actor).await?;
    Ok(RollbackResult {
        restored_from: filename.to_string(),
        state,
    })
}

// === config ===

impl Output for ResolvedSettings {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let paths = [
            ("repo", &self.repo_path),
            ("data-dir", &self.data_dir),
            ("state-file", &self.state_file),
            ("tickets-file", &self.tickets_file),
            ("features-file", &self.features_file),
            ("modules-file", &self.modules_file),
        ];
        let mut lines: Vec<String> = paths
            .iter()
            .map(|(name, r)| format!("{:<22} {} ({})", name, r.value.display(), r.source))
            .collect();
        lines.push(format!("{:<22} {}", "config", self.config_path.display()));
        let numbers = [
            ("max-backups", self.max_backups.value as u64, &self.max_backups.source),
            ("compress-after-hours", self.compress_after_hours.value, &self.compress_after_hours.source),
            ("history-limit", self.history_limit.value as u64, &self.history_limit.source),
            ("save-debounce-ms", self.save_debounce_ms.value, &self.save_debounce_ms.source),
            ("lock-retries", self.lock_retries.value as u64, &self.lock_retries.source),
            ("lock-base-delay-ms", self.lock_base_delay_ms.value, &self.lock_base_delay_ms.source),
        ];
        lines.extend(
            numbers
                .iter()
                .map(|(name, value, source)| format!("{:<22} {} ({})", name, value, source)),
        );
        lines.push(format!(
            "{:<22} {} ({})",
            "git-automation", self.git_automation.value, self.git_automation.source
        ));
        lines.join("\n")
    }
}
