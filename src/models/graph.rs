//! Graph algorithms for milestone dependency analysis.
//!
//! Milestones persist only their forward edges (`dependencies`). This module
//! derives the reverse adjacency ("dependents") on demand. The derived graph
//! is never stored, so it cannot go stale relative to the milestones map.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use super::Milestone;

/// Reverse dependency index over a set of milestones.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Maps each dependency id to the milestones that depend on it
    dependents: HashMap<String, BTreeSet<String>>,

    /// Forward edges, kept for traversal and cycle detection
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from milestones keyed by canonical id.
    ///
    /// Edges pointing at unknown milestones are kept: a missing dependency
    /// still has dependents, it just never resolves.
    pub fn build(milestones: &BTreeMap<String, Milestone>) -> Self {
        let mut graph = Self::default();
        for (id, milestone) in milestones {
            graph
                .dependencies
                .insert(id.clone(), milestone.dependencies.clone());
            for dep in &milestone.dependencies {
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }
        graph
    }

    /// Direct dependents of `id`, in id order.
    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.dependents.get(id).into_iter().flatten()
    }

    /// Every milestone that transitively depends on `root`, excluding `root`
    /// itself, in breadth-first discovery order.
    ///
    /// Terminates on cyclic graphs.
    pub fn transitive_dependents(&self, root: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(root);
        let mut order = Vec::new();
        let mut queue: VecDeque<&str> = self.dependents_of(root).map(String::as_str).collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id.to_string());
            queue.extend(self.dependents_of(id).map(String::as_str));
        }

        order
    }

    /// Order `ids` so that every milestone comes after the ones it depends on
    /// (within the subset). Members of a cycle keep their input order and are
    /// placed after everything that could be ordered.
    pub fn dependency_order(&self, ids: &[String]) -> Vec<String> {
        let subset: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut indegree: HashMap<&str, usize> = ids.iter().map(|id| (id.as_str(), 0)).collect();

        for id in ids {
            for dep in self.dependencies.get(id).into_iter().flatten() {
                if subset.contains(dep.as_str()) && dep != id {
                    *indegree.entry(id.as_str()).or_default() += 1;
                }
            }
        }

        let mut ready: VecDeque<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| indegree.get(id).copied() == Some(0))
            .collect();
        let mut ordered = Vec::with_capacity(ids.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while let Some(id) = ready.pop_front() {
            if !placed.insert(id) {
                continue;
            }
            ordered.push(id.to_string());
            for dependent in self.dependents_of(id) {
                let Some(count) = indegree.get_mut(dependent.as_str()) else {
                    continue;
                };
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(dependent.as_str());
                }
            }
        }

        for id in ids {
            if !placed.contains(id.as_str()) {
                ordered.push(id.clone());
            }
        }
        ordered
    }

    /// Ids of milestones that sit on at least one dependency cycle.
    pub fn find_cycles(&self) -> BTreeSet<String> {
        // Iterative DFS colouring: 1 = on stack, 2 = finished
        let mut colour: HashMap<&str, u8> = HashMap::new();
        let mut in_cycle = BTreeSet::new();
        let mut roots: Vec<&str> = self.dependencies.keys().map(String::as_str).collect();
        roots.sort_unstable();

        for root in roots {
            if colour.contains_key(root) {
                continue;
            }
            let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
            let mut path: Vec<&str> = vec![root];
            colour.insert(root, 1);

            while let Some((node, next)) = stack.last().copied() {
                let deps = self.dependencies.get(node).map(Vec::as_slice).unwrap_or(&[]);
                if next < deps.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let dep = deps[next].as_str();
                    match colour.get(dep).copied() {
                        Some(1) => {
                            if let Some(pos) = path.iter().position(|p| *p == dep) {
                                for member in &path[pos..] {
                                    in_cycle.insert(member.to_string());
                                }
                            }
                        }
                        Some(_) => {}
                        None => {
                            if self.dependencies.contains_key(dep) {
                                colour.insert(dep, 1);
                                stack.push((dep, 0));
                                path.push(dep);
                            }
                        }
                    }
                } else {
                    colour.insert(node, 2);
                    stack.pop();
                    path.pop();
                }
            }
        }

        in_cycle
    }

    /// Number of milestones with at least one dependent.
    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    /// True when no milestone has dependencies.
    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }
}
