//! Service-level dependency graph: hard (`requires`, plus `volumes_from`)
//! and soft (`wants_info`) edges, cycle detection, and layered ordering for
//! plays.

use crate::error::{MaestroError, MaestroResult};
use std::collections::{HashMap, HashSet};

/// Direction a play schedules layers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents: start, restart, pull.
    Forward,
    /// Dependents before dependencies: stop, kill, clean.
    Reverse,
}

/// Service-level adjacency. Hard edges drive both cycle detection and
/// ordering; soft edges drive env projection only and never affect either.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    hard: HashMap<String, HashSet<String>>,
    soft: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service with no edges yet, so it appears in `all_services`
    /// even when it neither requires nor is required by anything.
    pub fn add_service(&mut self, name: &str) {
        self.hard.entry(name.to_string()).or_default();
        self.soft.entry(name.to_string()).or_default();
    }

    /// `from` hard-depends on `to`.
    pub fn add_hard_edge(&mut self, from: &str, to: &str) {
        self.add_service(from);
        self.add_service(to);
        self.hard.get_mut(from).unwrap().insert(to.to_string());
    }

    /// `from` soft-depends on `to` (env projection only).
    pub fn add_soft_edge(&mut self, from: &str, to: &str) {
        self.add_service(from);
        self.add_service(to);
        self.soft.get_mut(from).unwrap().insert(to.to_string());
    }

    /// All registered service names.
    #[must_use]
    pub fn all_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hard.keys().cloned().collect();
        names.sort();
        names
    }

    /// Services `service` hard-depends on, sorted.
    #[must_use]
    pub fn hard_dependencies(&self, service: &str) -> Vec<String> {
        let mut v: Vec<String> = self
            .hard
            .get(service)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        v.sort();
        v
    }

    /// Services that hard-depend on `service`, sorted.
    #[must_use]
    pub fn hard_dependents(&self, service: &str) -> Vec<String> {
        let mut v: Vec<String> = self
            .hard
            .iter()
            .filter(|(_, deps)| deps.contains(service))
            .map(|(name, _)| name.clone())
            .collect();
        v.sort();
        v
    }

    /// Services `service` soft-depends on, sorted.
    #[must_use]
    pub fn soft_dependencies(&self, service: &str) -> Vec<String> {
        let mut v: Vec<String> = self
            .soft
            .get(service)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        v.sort();
        v
    }

    /// Find a cycle in the hard-edge graph via DFS, returning the closed
    /// path (`a`, `b`, ..., `a`) if one exists.
    #[must_use]
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<String, DfsMark> = HashMap::new();
        let mut stack: Vec<String> = Vec::new();

        for start in self.all_services() {
            if marks.contains_key(&start) {
                continue;
            }
            if let Some(cycle) = self.dfs_from(&start, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_from(
        &self,
        node: &str,
        marks: &mut HashMap<String, DfsMark>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        marks.insert(node.to_string(), DfsMark::InProgress);
        stack.push(node.to_string());

        for dep in self.hard_dependencies(node) {
            match marks.get(&dep) {
                Some(DfsMark::Done) => continue,
                Some(DfsMark::InProgress) => {
                    let start = stack.iter().position(|n| n == &dep).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..].to_vec();
                    path.push(dep);
                    return Some(path);
                }
                None => {
                    if let Some(cycle) = self.dfs_from(&dep, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        marks.insert(node.to_string(), DfsMark::Done);
        None
    }

    /// Validate the hard-edge graph has no cycle, returning a
    /// [`MaestroError::Config`] describing the cycle if one exists.
    pub fn validate_acyclic(&self) -> MaestroResult<()> {
        match self.detect_cycle() {
            Some(path) => Err(MaestroError::cycle(&path)),
            None => Ok(()),
        }
    }

    /// Layer `services` into parallel-safe batches using only hard edges
    /// among the named services (edges to services outside the set are
    /// ignored: those dependencies are assumed already satisfied). Each
    /// layer is sorted by name for deterministic play output.
    pub fn layered_order(&self, services: &[String], direction: Direction) -> Vec<Vec<String>> {
        let set: HashSet<String> = services.iter().cloned().collect();

        // in_degree[s] = number of unresolved predecessors under `direction`.
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for s in &set {
            in_degree.entry(s.clone()).or_insert(0);
            successors.entry(s.clone()).or_default();
        }
        for s in &set {
            let preds = match direction {
                Direction::Forward => self.hard_dependencies(s),
                Direction::Reverse => self.hard_dependents(s),
            };
            for p in preds {
                if set.contains(&p) {
                    *in_degree.get_mut(s).unwrap() += 1;
                    successors.get_mut(&p).unwrap().push(s.clone());
                }
            }
        }

        let mut layers = Vec::new();
        let mut remaining = in_degree;
        let mut done: HashSet<String> = HashSet::new();

        while done.len() < set.len() {
            let mut layer: Vec<String> = remaining
                .iter()
                .filter(|(node, deg)| !done.contains(*node) && **deg == 0)
                .map(|(node, _)| node.clone())
                .collect();
            if layer.is_empty() {
                // Shouldn't happen once `validate_acyclic` has run; fall
                // back to dumping everything remaining in one layer rather
                // than looping forever.
                layer = remaining
                    .keys()
                    .filter(|n| !done.contains(*n))
                    .cloned()
                    .collect();
            }
            layer.sort();
            for node in &layer {
                done.insert(node.clone());
                for succ in successors.get(node).cloned().unwrap_or_default() {
                    if let Some(d) = remaining.get_mut(&succ) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
            layers.push(layer);
        }
        layers
    }
}

#[derive(Clone, Copy, PartialEq)]
enum DfsMark {
    InProgress,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_simple_cycle() {
        let mut g = DependencyGraph::new();
        g.add_hard_edge("a", "b");
        g.add_hard_edge("b", "a");
        let cycle = g.detect_cycle().unwrap();
        assert!(cycle.first() == cycle.last());
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let mut g = DependencyGraph::new();
        g.add_hard_edge("web", "db");
        assert!(g.detect_cycle().is_none());
    }

    #[test]
    fn layered_order_respects_hard_edges_forward() {
        let mut g = DependencyGraph::new();
        g.add_hard_edge("web", "db");
        g.add_hard_edge("worker", "db");
        let layers = g.layered_order(
            &["web".into(), "db".into(), "worker".into()],
            Direction::Forward,
        );
        assert_eq!(layers[0], vec!["db".to_string()]);
        assert_eq!(layers[1], vec!["web".to_string(), "worker".to_string()]);
    }

    #[test]
    fn layered_order_reverses_for_stop() {
        let mut g = DependencyGraph::new();
        g.add_hard_edge("web", "db");
        let layers = g.layered_order(&["web".into(), "db".into()], Direction::Reverse);
        assert_eq!(layers[0], vec!["web".to_string()]);
        assert_eq!(layers[1], vec!["db".to_string()]);
    }

    #[test]
    fn soft_edges_never_affect_ordering() {
        let mut g = DependencyGraph::new();
        g.add_soft_edge("web", "metrics");
        let layers = g.layered_order(&["web".into(), "metrics".into()], Direction::Forward);
        assert_eq!(layers.len(), 1);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A straight-line chain `s0 <- s1 <- ... <- sn` (each requiring the
        /// previous) must always layer into `n + 1` singleton layers, in
        /// chain order, regardless of chain length.
        #[test]
        fn linear_chain_layers_one_service_at_a_time(len in 1usize..12) {
            let names: Vec<String> = (0..len).map(|i| format!("s{i}")).collect();
            let mut g = DependencyGraph::new();
            g.add_service(&names[0]);
            for pair in names.windows(2) {
                g.add_hard_edge(&pair[1], &pair[0]);
            }
            let layers = g.layered_order(&names, Direction::Forward);
            prop_assert_eq!(layers.len(), len);
            for (layer, expected) in layers.iter().zip(names.iter()) {
                prop_assert_eq!(layer, &vec![expected.clone()]);
            }
        }
    }
}
