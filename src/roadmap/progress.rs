//! Weighted completion and dependency gating.
//!
//! A milestone's progress is the smaller of two numbers:
//!
//! - its own weighted progress, from linked tickets (weight 1), features
//!   (weight 3) and modules (weight 5), or the stored value when nothing is
//!   linked;
//! - its gating progress, the minimum progress across its dependencies.
//!
//! A blocked or paused linked entity zeroes the milestone's own progress. A
//! blocked or paused milestone always reports zero.

use std::collections::BTreeMap;

use crate::models::domain::{DomainIndex, EntityKind, EntityProgress};
use crate::models::{
    DependencyItem, DependencyState, DependencySummary, GateStatus, Milestone, RoadmapStatus,
};

/// Inputs shared by every progress calculation in one pass.
pub struct ProgressContext<'a> {
    pub domain: &'a DomainIndex<'a>,
    pub milestones: &'a BTreeMap<String, Milestone>,
}

/// A milestone's contribution before dependency gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnProgress {
    /// Weighted completion of linked entities
    Weighted(u8),
    /// Nothing linked; the stored value stands
    Unlinked(u8),
    /// A linked entity is blocked or paused
    Blocked,
}

impl OwnProgress {
    pub fn value(&self) -> u8 {
        match self {
            OwnProgress::Weighted(p) | OwnProgress::Unlinked(p) => *p,
            OwnProgress::Blocked => 0,
        }
    }
}

/// Result of recomputing one milestone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub progress: u8,
    pub status: RoadmapStatus,
    pub dependency_summary: DependencySummary,
}

impl Evaluation {
    /// Write the derived fields onto `milestone`.
    pub fn apply(self, milestone: &mut Milestone) {
        milestone.progress = self.progress;
        milestone.status = self.status;
        milestone.dependency_summary = Some(self.dependency_summary);
    }
}

/// Weighted completion of the entities a milestone links to.
pub fn calculate_own_progress(milestone: &Milestone, domain: &DomainIndex<'_>) -> OwnProgress {
    if !milestone.has_links() {
        return OwnProgress::Unlinked(milestone.progress.min(100));
    }

    let mut total = 0u32;
    let mut completed = 0u32;
    for (kind, ids) in [
        (EntityKind::Ticket, &milestone.linked_tickets),
        (EntityKind::Feature, &milestone.linked_features),
        (EntityKind::Module, &milestone.linked_modules),
    ] {
        for id in ids {
            match domain.resolve(kind, id) {
                EntityProgress::Blocked => return OwnProgress::Blocked,
                EntityProgress::Complete => {
                    total += kind.weight();
                    completed += kind.weight();
                }
                EntityProgress::Incomplete => total += kind.weight(),
            }
        }
    }

    let percent = (completed * 100 + total / 2) / total.max(1);
    OwnProgress::Weighted(percent.min(100) as u8)
}

/// Classify each dependency and compute the gating progress.
pub fn build_dependency_summary(
    milestone: &Milestone,
    milestones: &BTreeMap<String, Milestone>,
) -> DependencySummary {
    let mut summary = DependencySummary {
        gating_progress: 100,
        ..Default::default()
    };

    for dep_id in &milestone.dependencies {
        let item = match milestones.get(dep_id) {
            None => DependencyItem {
                id: dep_id.clone(),
                title: None,
                state: DependencyState::Missing,
                progress: 0,
            },
            Some(dep) => {
                let (state, progress) = if dep.status.is_halted() {
                    (DependencyState::Blocked, 0)
                } else if dep.status == RoadmapStatus::Completed || dep.progress >= 100 {
                    (DependencyState::Completed, 100)
                } else {
                    (DependencyState::Pending, dep.progress)
                };
                DependencyItem {
                    id: dep_id.clone(),
                    title: Some(dep.title.clone()),
                    state,
                    progress,
                }
            }
        };

        match item.state {
            DependencyState::Missing => summary.missing += 1,
            DependencyState::Blocked => summary.blocked += 1,
            DependencyState::Completed => summary.completed += 1,
            DependencyState::Pending => summary.pending += 1,
        }
        summary.gating_progress = summary.gating_progress.min(item.progress);
        summary.items.push(item);
    }

    summary.total = summary.items.len();
    summary.status = if summary.blocked > 0 {
        GateStatus::Blocked
    } else if summary.completed < summary.total {
        GateStatus::Pending
    } else {
        GateStatus::Clear
    };
    summary
}

/// Status after dependency effects.
///
/// Completed never changes. A blocked dependency blocks the milestone. A
/// milestone that was blocked only by its dependencies resumes once they
/// clear, unless the caller pinned the status explicitly.
pub fn derive_status(
    milestone: &Milestone,
    summary: &DependencySummary,
    own: OwnProgress,
    status_pinned: bool,
) -> RoadmapStatus {
    let current = milestone.status;
    if current == RoadmapStatus::Completed {
        return current;
    }
    if summary.status == GateStatus::Blocked {
        return RoadmapStatus::Blocked;
    }

    let was_gated = milestone
        .dependency_summary
        .as_ref()
        .is_some_and(|s| s.status == GateStatus::Blocked);
    if current == RoadmapStatus::Blocked && was_gated && !status_pinned {
        return if own.value() > 0 {
            RoadmapStatus::Active
        } else {
            RoadmapStatus::Pending
        };
    }

    current
}

/// Recompute progress, status and dependency summary for one milestone.
///
/// `milestone` is read as-is; the other milestones come from `ctx`.
pub fn evaluate(milestone: &Milestone, ctx: &ProgressContext<'_>, status_pinned: bool) -> Evaluation {
    let own = calculate_own_progress(milestone, ctx.domain);
    let summary = build_dependency_summary(milestone, ctx.milestones);
    let status = derive_status(milestone, &summary, own, status_pinned);

    let progress = if status.is_halted() {
        0
    } else {
        own.value().min(summary.gating_progress)
    };

    Evaluation {
        progress,
        status,
        dependency_summary: summary,
    }
}
