//! Propagation of recomputation through dependent milestones.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::diff::{compute_changed_fields, diff_milestone};
use super::progress::{ProgressContext, evaluate};
use crate::models::domain::DomainIndex;
use crate::models::graph::DependencyGraph;
use crate::models::{Milestone, MilestoneChange};

/// Recompute every transitive dependent of `root_id`.
///
/// Each dependent is visited exactly once, after the dependents it relies on
/// within the affected set, so a single pass settles chains of any depth.
/// `root_id` itself is never revisited, and a cyclic graph still terminates.
/// Milestones whose derived fields change get their `updated_at` stamped and
/// produce a diff tagged `cascade: true` against `previous`.
pub fn apply_dependency_cascade(
    root_id: &str,
    milestones: &mut BTreeMap<String, Milestone>,
    domain: &DomainIndex<'_>,
    graph: &DependencyGraph,
    previous: &BTreeMap<String, Milestone>,
    timestamp: DateTime<Utc>,
) -> Vec<MilestoneChange> {
    let affected = graph.transitive_dependents(root_id);
    let order = graph.dependency_order(&affected);
    let mut changes = Vec::new();

    for id in order {
        let Some(current) = milestones.get(&id) else {
            // Dependents map can reference ids absent from the map
            continue;
        };

        let evaluation = {
            let ctx = ProgressContext {
                domain,
                milestones: &*milestones,
            };
            evaluate(current, &ctx, false)
        };

        let mut next = current.clone();
        evaluation.apply(&mut next);

        let baseline = previous.get(&id).unwrap_or(current);
        let fields = compute_changed_fields(baseline, &next, &[]);
        if fields.is_empty() {
            continue;
        }

        next.updated_at = Some(timestamp);
        tracing::debug!(milestone = %id, fields = ?fields, "cascade recalculated dependent");
        changes.push(diff_milestone(baseline, &next, &fields, None, true, timestamp));
        milestones.insert(id, next);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::DomainSnapshot;
    use crate::models::{GateStatus, RoadmapStatus};

    fn milestone(id: &str, status: RoadmapStatus, progress: u8, deps: &[&str]) -> Milestone {
        let mut m = Milestone::new(id, id.to_uppercase());
        m.status = status;
        m.progress = progress;
        m.dependencies = deps.iter().map(|d| d.to_string()).collect();
        m
    }

    fn map(items: Vec<Milestone>) -> BTreeMap<String, Milestone> {
        items.into_iter().map(|m| (m.id.clone(), m)).collect()
    }

    #[test]
    fn test_cascade_reaches_transitive_dependents() {
        let mut all = map(vec![
            milestone("a", RoadmapStatus::Blocked, 0, &[]),
            milestone("b", RoadmapStatus::Active, 60, &["a"]),
            milestone("c", RoadmapStatus::Active, 40, &["b"]),
        ]);
        let previous = all.clone();
        let graph = DependencyGraph::build(&all);
        let snapshot = DomainSnapshot::default();

        let changes =
            apply_dependency_cascade("a", &mut all, &snapshot.index(), &graph, &previous, Utc::now());

        let ids: Vec<&str> = changes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(changes.iter().all(|c| c.cascade));
        assert_eq!(all["c"].status, RoadmapStatus::Blocked);
        assert_eq!(all["c"].progress, 0);
        assert_eq!(
            all["c"].dependency_summary.as_ref().unwrap().status,
            GateStatus::Blocked
        );
    }

    #[test]
    fn test_cascade_skips_unchanged_dependents() {
        let mut all = map(vec![
            milestone("a", RoadmapStatus::Completed, 100, &[]),
            milestone("b", RoadmapStatus::Active, 30, &["a"]),
        ]);
        // Settle derived fields first so the second pass has nothing to do
        let previous = all.clone();
        let graph = DependencyGraph::build(&all);
        let snapshot = DomainSnapshot::default();
        let index = snapshot.index();
        apply_dependency_cascade("a", &mut all, &index, &graph, &previous, Utc::now());

        let settled = all.clone();
        let changes = apply_dependency_cascade("a", &mut all, &index, &graph, &settled, Utc::now());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_cascade_terminates_on_cycle() {
        let mut all = map(vec![
            milestone("a", RoadmapStatus::Blocked, 0, &["c"]),
            milestone("b", RoadmapStatus::Active, 50, &["a"]),
            milestone("c", RoadmapStatus::Active, 50, &["b"]),
        ]);
        let previous = all.clone();
        let graph = DependencyGraph::build(&all);
        let snapshot = DomainSnapshot::default();

        let changes =
            apply_dependency_cascade("a", &mut all, &snapshot.index(), &graph, &previous, Utc::now());
        assert!(changes.iter().all(|c| c.id != "a"));
        assert_eq!(all["a"].status, RoadmapStatus::Blocked);
    }

    #[test]
    fn test_diamond_settles_in_one_pass() {
        // d depends on a directly and through b -> c
        let mut all = map(vec![
            milestone("a", RoadmapStatus::Active, 20, &[]),
            milestone("b", RoadmapStatus::Active, 100, &["a"]),
            milestone("c", RoadmapStatus::Active, 100, &["b"]),
            milestone("d", RoadmapStatus::Active, 100, &["a", "c"]),
        ]);
        let previous = all.clone();
        let graph = DependencyGraph::build(&all);
        let snapshot = DomainSnapshot::default();

        apply_dependency_cascade("a", &mut all, &snapshot.index(), &graph, &previous, Utc::now());
        assert_eq!(all["b"].progress, 20);
        assert_eq!(all["c"].progress, 20);
        assert_eq!(all["d"].progress, 20);
    }
}
