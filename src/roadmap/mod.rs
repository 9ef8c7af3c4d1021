//! Roadmap engine: transactional milestone updates and bulk re-derivation.
//!
//! [`RoadmapEngine`] ties the pieces together. An update flows
//! load -> graph build -> progress -> transition check -> cascade -> diff ->
//! persist -> notify, and either writes exactly one history entry or nothing
//! at all. In-process callers are serialized by the store's update guard;
//! other processes are kept out by the store's lockfile.

pub mod cascade;
pub mod diff;
pub mod progress;
pub mod transition;

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::{EventBus, StateSyncEvent};
use crate::git::{CommitContext, GitAutomation, GitAutomationResult, MIN_COMPLETION_SUMMARY_LEN};
use crate::models::domain::DomainSnapshot;
use crate::models::graph::DependencyGraph;
use crate::models::{
    Milestone, MilestoneChange, MilestonePatch, RoadmapState, RoadmapStatus, RoadmapSummary,
    canonical_id, dedupe,
};
use crate::storage::{BackupInfo, DomainLoader, FlushInput, StateStore, WriteMode};
use crate::{Error, Result};

use cascade::apply_dependency_cascade;
use diff::{build_history_entry, compute_changed_fields, diff_milestone, diff_states};
use progress::{ProgressContext, evaluate};
use transition::validate_transition;

/// Reasons starting with this prefix mark edits made by a person.
pub const MANUAL_REASON_PREFIX: &str = "roadmap:manual";

/// Default reason for direct updates.
pub const DEFAULT_UPDATE_REASON: &str = "roadmap:update";

/// Default reason for bulk re-derivation.
pub const DEFAULT_SYNC_REASON: &str = "roadmap:sync";

/// Options for [`RoadmapEngine::update_milestone`] and
/// [`RoadmapEngine::insert_milestone`].
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub reason: String,
    pub actor: Option<String>,
    pub skip_git_automation: bool,
    /// Use this snapshot instead of asking the domain loader
    pub domain_override: Option<DomainSnapshot>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            reason: DEFAULT_UPDATE_REASON.to_string(),
            actor: None,
            skip_git_automation: false,
            domain_override: None,
        }
    }
}

impl UpdateOptions {
    /// Options for an edit made by `actor`.
    pub fn manual(actor: impl Into<String>) -> Self {
        Self {
            reason: MANUAL_REASON_PREFIX.to_string(),
            actor: Some(actor.into()),
            ..Default::default()
        }
    }

    fn is_manual(&self) -> bool {
        self.reason.starts_with(MANUAL_REASON_PREFIX)
    }
}

/// Options for [`RoadmapEngine::sync`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub reason: String,
    pub actor: Option<String>,
    pub domain_override: Option<DomainSnapshot>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reason: DEFAULT_SYNC_REASON.to_string(),
            actor: None,
            domain_override: None,
        }
    }
}

/// Result of a single-milestone update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub state: RoadmapState,
    pub milestone: Milestone,
    pub changes: Vec<MilestoneChange>,
    /// Ids of dependents recalculated by the cascade
    pub cascade: Vec<String>,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_automation: Option<GitAutomationResult>,
}

/// Result of a bulk re-derivation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub state: RoadmapState,
    pub changes: Vec<MilestoneChange>,
    pub changed: bool,
}

/// The roadmap state engine.
pub struct RoadmapEngine {
    store: Arc<StateStore>,
    loader: Arc<dyn DomainLoader>,
    git: Arc<dyn GitAutomation>,
    events: EventBus,
}

impl RoadmapEngine {
    pub fn new(
        store: Arc<StateStore>,
        loader: Arc<dyn DomainLoader>,
        git: Arc<dyn GitAutomation>,
    ) -> Self {
        Self {
            store,
            loader,
            git,
            events: EventBus::new(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Receive a [`StateSyncEvent`] for every persisted change.
    pub fn subscribe(&self) -> broadcast::Receiver<StateSyncEvent> {
        self.events.subscribe()
    }

    /// Current state (cached, loaded on first use).
    pub async fn state(&self) -> Result<RoadmapState> {
        self.store.state().await
    }

    /// Look up one milestone by id.
    pub async fn milestone(&self, id: &str) -> Result<Milestone> {
        let state = self.store.state().await?;
        let key = resolve_id(&state.milestones, id)
            .ok_or_else(|| Error::UnknownMilestone(id.to_string()))?;
        Ok(state.milestones[&key].clone())
    }

    /// Apply a partial update to one milestone and propagate it.
    ///
    /// A no-op update returns the current state with `changed: false`
    /// and writes nothing.
    pub async fn update_milestone(
        &self,
        id: &str,
        patch: MilestonePatch,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        if patch.is_empty() {
            return Err(Error::NoUpdates);
        }
        let _guard = self.store.lock_updates().await;

        let state = self.store.state().await?;
        let key = resolve_id(&state.milestones, id)
            .ok_or_else(|| Error::UnknownMilestone(id.to_string()))?;
        let update = patch.sanitize()?;
        let previous = state.milestones[&key].clone();

        if let Some(requested) = update.status {
            validate_transition(previous.status, requested)?;
        }

        let domain = self.domain(options.domain_override.clone()).await?;
        let index = domain.index();

        let mut milestones = state.milestones.clone();
        let candidate = update.apply_to(&previous);
        milestones.insert(key.clone(), candidate.clone());
        let graph = DependencyGraph::build(&milestones);

        let mut next = candidate;
        let evaluation = {
            let ctx = ProgressContext {
                domain: &index,
                milestones: &milestones,
            };
            evaluate(&next, &ctx, update.status.is_some())
        };
        evaluation.apply(&mut next);

        let now = Utc::now();
        let completing =
            next.status == RoadmapStatus::Completed && previous.status != RoadmapStatus::Completed;
        if completing {
            self.prepare_completion(&mut next, now).await;
        }

        let fields = compute_changed_fields(&previous, &next, &update.requested_fields());
        if !fields.is_empty() {
            next.updated_at = Some(now);
            if let Some(actor) = &options.actor {
                next.last_edited_by = Some(actor.clone());
            }
        }
        milestones.insert(key.clone(), next.clone());

        let cascaded = apply_dependency_cascade(
            &key,
            &mut milestones,
            &index,
            &graph,
            &state.milestones,
            now,
        );

        if fields.is_empty() && cascaded.is_empty() {
            tracing::debug!(milestone = %key, "update changed nothing, skipping write");
            return Ok(UpdateResult {
                state,
                milestone: previous,
                changes: Vec::new(),
                cascade: Vec::new(),
                changed: false,
                git_automation: None,
            });
        }

        let mut changes = Vec::with_capacity(cascaded.len() + 1);
        if !fields.is_empty() {
            changes.push(diff_milestone(
                &previous,
                &next,
                &fields,
                options.actor.as_deref(),
                false,
                now,
            ));
        }
        let cascade_ids: Vec<String> = cascaded.iter().map(|c| c.id.clone()).collect();
        changes.extend(cascaded);
        tracing::debug!(milestone = %key, cascade = cascade_ids.len(), "applying milestone update");

        let written = self
            .persist(state, milestones, &options.reason, options.actor.as_deref(), changes.clone(), now)
            .await?;

        let git_automation = if completing && options.is_manual() && !options.skip_git_automation {
            let context = CommitContext {
                dependency_summary: next.dependency_summary.clone(),
                reason: options.reason.clone(),
                actor: options.actor.clone(),
            };
            Some(self.git.auto_commit_milestone(&next, &context).await)
        } else {
            None
        };

        Ok(UpdateResult {
            milestone: written.milestones.get(&key).cloned().unwrap_or(next),
            state: written,
            changes,
            cascade: cascade_ids,
            changed: true,
            git_automation,
        })
    }

    /// Add a new milestone to the roadmap.
    pub async fn insert_milestone(
        &self,
        milestone: Milestone,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let id = milestone.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidInput("milestone id must not be empty".to_string()));
        }
        let _guard = self.store.lock_updates().await;

        let state = self.store.state().await?;
        if resolve_id(&state.milestones, &id).is_some() {
            return Err(Error::DuplicateMilestone(id));
        }

        let domain = self.domain(options.domain_override.clone()).await?;
        let index = domain.index();

        let mut next = milestone;
        next.id = id.clone();
        next.progress = next.progress.min(100);
        for ids in [
            &mut next.dependencies,
            &mut next.linked_tickets,
            &mut next.linked_features,
            &mut next.linked_modules,
        ] {
            ids.iter_mut().for_each(|v| *v = v.trim().to_string());
            ids.retain(|v| !v.is_empty());
            dedupe(ids);
        }
        next.dependencies.retain(|dep| *dep != id);

        let mut milestones = state.milestones.clone();
        milestones.insert(id.clone(), next.clone());
        let graph = DependencyGraph::build(&milestones);
        let evaluation = {
            let ctx = ProgressContext {
                domain: &index,
                milestones: &milestones,
            };
            evaluate(&next, &ctx, false)
        };
        evaluation.apply(&mut next);

        let now = Utc::now();
        next.updated_at = Some(now);
        next.last_edited_by = options.actor.clone();
        if next.status == RoadmapStatus::Completed && next.completed_at.is_none() {
            next.completed_at = Some(now);
        }
        milestones.insert(id.clone(), next.clone());

        // Dependents that referenced this id while it was missing
        let cascaded =
            apply_dependency_cascade(&id, &mut milestones, &index, &graph, &state.milestones, now);

        let blank = Milestone::new(id.clone(), next.title.clone());
        let fields = compute_changed_fields(
            &blank,
            &next,
            &["title", "description", "linkedTickets", "linkedFeatures", "linkedModules"],
        );
        let mut changes = vec![diff_milestone(
            &blank,
            &next,
            &fields,
            options.actor.as_deref(),
            false,
            now,
        )];
        let cascade_ids: Vec<String> = cascaded.iter().map(|c| c.id.clone()).collect();
        changes.extend(cascaded);
        tracing::info!(milestone = %id, "inserted milestone");

        let written = self
            .persist(state, milestones, &options.reason, options.actor.as_deref(), changes.clone(), now)
            .await?;

        Ok(UpdateResult {
            milestone: written.milestones.get(&id).cloned().unwrap_or(next),
            state: written,
            changes,
            cascade: cascade_ids,
            changed: true,
            git_automation: None,
        })
    }

    /// Re-derive every milestone and save through the debounced queue.
    ///
    /// The re-derivation runs when the batch flushes, against the state on
    /// disk at that moment, so updates written while the save was pending
    /// are kept. Concurrent syncs coalesce: each caller receives the state
    /// of the batch that was finally written, and only the sync whose plan
    /// ran publishes an event.
    pub async fn sync(&self, options: SyncOptions) -> Result<SyncResult> {
        let plan = self.sync_plan(&options).await?;
        let flushed = self
            .store
            .schedule_save(Box::new(move |input: FlushInput| {
                let baseline = input.cached.as_ref().unwrap_or(&input.current);
                plan.apply(baseline, &input.current, Utc::now())
                    .map(|(next, _)| next)
            }))
            .await?;

        if !flushed.written {
            return Ok(SyncResult {
                state: flushed.state,
                changes: Vec::new(),
                changed: false,
            });
        }
        let changes = flushed
            .state
            .history
            .first()
            .map(|entry| entry.changes.clone())
            .unwrap_or_default();
        if flushed.applied {
            self.publish(&options.reason, options.actor.as_deref(), &flushed.state, &changes);
        }
        Ok(SyncResult {
            state: flushed.state,
            changes,
            changed: true,
        })
    }

    /// Re-derive every milestone and write immediately.
    pub async fn sync_now(&self, options: SyncOptions) -> Result<SyncResult> {
        let plan = self.sync_plan(&options).await?;
        let _guard = self.store.lock_updates().await;

        let cached = self.store.cached().await;
        let current = self.store.load().await?;
        let baseline = cached.as_ref().unwrap_or(&current);
        let Some((next, changes)) = plan.apply(baseline, &current, Utc::now()) else {
            return Ok(SyncResult {
                state: current,
                changes: Vec::new(),
                changed: false,
            });
        };

        let written = self.store.write_now(next, WriteMode::WithBackup).await?;
        self.publish(&options.reason, options.actor.as_deref(), &written, &changes);
        Ok(SyncResult {
            state: written,
            changes,
            changed: true,
        })
    }

    /// Replace the current state with a backup.
    pub async fn rollback(&self, filename: &str, actor: Option<&str>) -> Result<RoadmapState> {
        let _guard = self.store.lock_updates().await;
        let before = self.store.state().await?;
        let restored = self.store.rollback(filename).await?;

        let changes = diff_states(&before.milestones, &restored.milestones, Utc::now());
        self.publish(&format!("roadmap:rollback:{}", filename), actor, &restored, &changes);
        Ok(restored)
    }

    /// Backups available for rollback, most recent first.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.store.list_backups().await
    }

    async fn domain(&self, domain_override: Option<DomainSnapshot>) -> Result<DomainSnapshot> {
        match domain_override {
            Some(snapshot) => Ok(snapshot),
            None => self.loader.load_domain().await,
        }
    }

    async fn prepare_completion(&self, milestone: &mut Milestone, now: chrono::DateTime<Utc>) {
        if milestone.completed_at.is_none() {
            milestone.completed_at = Some(now);
        }
        let has_summary = milestone
            .completion_summary
            .as_ref()
            .is_some_and(|s| s.trim().chars().count() >= MIN_COMPLETION_SUMMARY_LEN);
        if has_summary {
            return;
        }
        match self
            .git
            .generate_completion_summary(milestone, milestone.dependency_summary.as_ref())
            .await
        {
            Ok(summary) => milestone.completion_summary = Some(summary),
            Err(e) => {
                tracing::warn!(milestone = %milestone.id, error = %e, "could not generate completion summary")
            }
        }
    }

    async fn sync_plan(&self, options: &SyncOptions) -> Result<SyncPlan> {
        let source = match &options.domain_override {
            Some(_) => "override".to_string(),
            None => self.loader.source(),
        };
        Ok(SyncPlan {
            domain: self.domain(options.domain_override.clone()).await?,
            source,
            reason: options.reason.clone(),
            actor: options.actor.clone(),
            history_limit: self.store.options().history_limit,
        })
    }

    async fn persist(
        &self,
        mut state: RoadmapState,
        milestones: BTreeMap<String, Milestone>,
        reason: &str,
        actor: Option<&str>,
        changes: Vec<MilestoneChange>,
        now: chrono::DateTime<Utc>,
    ) -> Result<RoadmapState> {
        let limit = self.store.options().history_limit;
        state.milestones = milestones;
        state.record_history(build_history_entry(reason, actor, changes.clone(), now), limit);

        let written = self.store.write_now(state, WriteMode::WithBackup).await?;
        self.publish(reason, actor, &written, &changes);
        Ok(written)
    }

    fn publish(
        &self,
        reason: &str,
        actor: Option<&str>,
        state: &RoadmapState,
        changes: &[MilestoneChange],
    ) {
        let summary = state
            .history
            .first()
            .filter(|entry| entry.reason == reason)
            .map(|entry| entry.summary.clone())
            .unwrap_or_else(|| diff::summarize_changes(changes));
        self.events.publish(StateSyncEvent {
            reason: reason.to_string(),
            summary,
            state: state.clone(),
            changes: changes.to_vec(),
            timestamp: Utc::now(),
            actor: actor.map(str::to_string),
        });
    }
}

/// Everything a sync needs besides the state it runs against.
struct SyncPlan {
    domain: DomainSnapshot,
    source: String,
    reason: String,
    actor: Option<String>,
    history_limit: usize,
}

impl SyncPlan {
    /// Re-derive every milestone of `current` and diff the result against
    /// `baseline`. `None` when nothing differs.
    fn apply(
        &self,
        baseline: &RoadmapState,
        current: &RoadmapState,
        now: chrono::DateTime<Utc>,
    ) -> Option<(RoadmapState, Vec<MilestoneChange>)> {
        let index = self.domain.index();
        let mut milestones = current.milestones.clone();
        let graph = DependencyGraph::build(&milestones);
        let ids: Vec<String> = milestones.keys().cloned().collect();

        for id in graph.dependency_order(&ids) {
            let Some(existing) = milestones.get(&id) else {
                continue;
            };
            let evaluation = {
                let ctx = ProgressContext {
                    domain: &index,
                    milestones: &milestones,
                };
                evaluate(existing, &ctx, false)
            };
            let mut next = existing.clone();
            evaluation.apply(&mut next);
            if !compute_changed_fields(existing, &next, &[]).is_empty() {
                next.updated_at = Some(now);
                milestones.insert(id, next);
            }
        }

        let changes = diff_states(&baseline.milestones, &milestones, now);
        if changes.is_empty() {
            tracing::debug!("sync found nothing to change");
            return None;
        }
        tracing::info!(changes = changes.len(), reason = %self.reason, "sync re-derived roadmap");

        let mut next = current.clone();
        next.milestones = milestones;
        next.summary = RoadmapSummary {
            source: self.source.clone(),
            ticket_count: self.domain.tickets.len(),
            feature_count: self.domain.features.len(),
            module_count: self.domain.modules.len(),
            generated_at: Some(now),
        };
        next.record_history(
            build_history_entry(&self.reason, self.actor.as_deref(), changes.clone(), now),
            self.history_limit,
        );
        Some((next, changes))
    }
}

/// Find the stored key for `id`, tolerating whitespace and numeric forms.
fn resolve_id(milestones: &BTreeMap<String, Milestone>, id: &str) -> Option<String> {
    if milestones.contains_key(id) {
        return Some(id.to_string());
    }
    let trimmed = id.trim();
    if milestones.contains_key(trimmed) {
        return Some(trimmed.to_string());
    }
    let numeric = trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .and_then(|n| canonical_id(&serde_json::Value::Number(n)));
    numeric.filter(|key| milestones.contains_key(key))
}
