//! Link-graph expansion
//!
//! Grows a candidate set along the note link graph: breadth-first over
//! outgoing links and backlinks, plus co-citation discovery (other notes
//! pointing at the same targets as the inputs).

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::store::LinkGraph;

pub struct GraphExpander {
    graph: Arc<dyn LinkGraph>,
}

impl GraphExpander {
    pub fn new(graph: Arc<dyn LinkGraph>) -> Self {
        Self { graph }
    }

    /// BFS over outgoing links and backlinks, at most `hops` levels deep.
    ///
    /// Each node is visited once. Traversal stops early when an iteration
    /// discovers nothing new, even with hops to spare. The seeds are
    /// included in the result, in input order.
    pub fn expand_from_notes(&self, seeds: &[String], hops: usize) -> Vec<String> {
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut ordered: Vec<String> = Vec::new();
        for seed in seeds {
            if !ordered.contains(seed) {
                ordered.push(seed.clone());
            }
        }
        let mut frontier: Vec<String> = ordered.clone();

        for _ in 0..hops {
            let mut next = Vec::new();
            for node in &frontier {
                let mut neighbors = self.graph.outgoing_links(node);
                neighbors.extend(self.graph.backlinks(node));
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            ordered.extend(next.iter().cloned());
            frontier = next;
        }

        ordered
    }

    /// Notes linked to the same targets the inputs link to, excluding the
    /// inputs themselves. Surfaces notes connected through a shared
    /// reference even when no direct hop joins them.
    pub fn co_citations(&self, paths: &[String]) -> Vec<String> {
        let inputs: HashSet<&String> = paths.iter().collect();
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for path in paths {
            for target in self.graph.outgoing_links(path) {
                for sibling in self.graph.backlinks(&target) {
                    if inputs.contains(&sibling) {
                        continue;
                    }
                    if seen.insert(sibling.clone()) {
                        results.push(sibling);
                    }
                }
            }
        }

        results
    }

    /// Compose BFS expansion of the grep hits, BFS expansion of the active
    /// note, and co-citations of the hits.
    ///
    /// Co-citation cost scales with input size while its marginal recall
    /// drops, so it only runs below `co_citation_threshold` grep hits.
    pub fn expand_candidates(
        &self,
        grep_hits: &[String],
        active_note: Option<&str>,
        hops: usize,
        co_citation_threshold: usize,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut add_all = |paths: Vec<String>, seen: &mut HashSet<String>, out: &mut Vec<String>| {
            for path in paths {
                if seen.insert(path.clone()) {
                    out.push(path);
                }
            }
        };

        add_all(
            self.expand_from_notes(grep_hits, hops),
            &mut seen,
            &mut candidates,
        );

        if let Some(active) = active_note {
            add_all(
                self.expand_from_notes(&[active.to_string()], hops),
                &mut seen,
                &mut candidates,
            );
        }

        if grep_hits.len() < co_citation_threshold {
            add_all(self.co_citations(grep_hits), &mut seen, &mut candidates);
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemGraph {
        outgoing: HashMap<String, Vec<String>>,
        backlinks: HashMap<String, Vec<String>>,
    }

    impl MemGraph {
        /// Build from directed edges, deriving backlinks
        fn new(edges: &[(&str, &str)]) -> Self {
            let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
            let mut backlinks: HashMap<String, Vec<String>> = HashMap::new();
            for (from, to) in edges {
                outgoing
                    .entry(from.to_string())
                    .or_default()
                    .push(to.to_string());
                backlinks
                    .entry(to.to_string())
                    .or_default()
                    .push(from.to_string());
            }
            Self {
                outgoing,
                backlinks,
            }
        }
    }

    impl LinkGraph for MemGraph {
        fn outgoing_links(&self, path: &str) -> Vec<String> {
            self.outgoing.get(path).cloned().unwrap_or_default()
        }

        fn backlinks(&self, path: &str) -> Vec<String> {
            self.backlinks.get(path).cloned().unwrap_or_default()
        }
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// A chain A -> B -> C -> D
    fn chain() -> MemGraph {
        MemGraph::new(&[("A", "B"), ("B", "C"), ("C", "D")])
    }

    #[test]
    fn test_bfs_respects_hop_bound() {
        let expander = GraphExpander::new(Arc::new(chain()));
        let result = expander.expand_from_notes(&paths(&["A"]), 2);
        assert_eq!(result, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_bfs_terminates_early_past_diameter() {
        let expander = GraphExpander::new(Arc::new(chain()));
        let result = expander.expand_from_notes(&paths(&["A"]), 100);
        assert_eq!(result, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_bfs_visits_once_on_cycles() {
        let graph = MemGraph::new(&[("A", "B"), ("B", "A")]);
        let expander = GraphExpander::new(Arc::new(graph));
        let result = expander.expand_from_notes(&paths(&["A"]), 5);
        assert_eq!(result, vec!["A", "B"]);
    }

    #[test]
    fn test_bfs_follows_backlinks() {
        // Only C -> D exists; from D the backlink reaches C
        let graph = MemGraph::new(&[("C", "D")]);
        let expander = GraphExpander::new(Arc::new(graph));
        let result = expander.expand_from_notes(&paths(&["D"]), 1);
        assert_eq!(result, vec!["D", "C"]);
    }

    #[test]
    fn test_co_citations_share_a_target() {
        // A and X both link to T; co-citations of [A] should surface X
        let graph = MemGraph::new(&[("A", "T"), ("X", "T")]);
        let expander = GraphExpander::new(Arc::new(graph));
        assert_eq!(expander.co_citations(&paths(&["A"])), vec!["X"]);
    }

    #[test]
    fn test_co_citations_exclude_inputs() {
        let graph = MemGraph::new(&[("A", "T"), ("B", "T")]);
        let expander = GraphExpander::new(Arc::new(graph));
        assert!(expander.co_citations(&paths(&["A", "B"])).is_empty());
    }

    #[test]
    fn test_expand_candidates_skips_co_citation_above_threshold() {
        let graph = MemGraph::new(&[("A", "T"), ("X", "T"), ("B", "U"), ("Y", "U")]);
        let expander = GraphExpander::new(Arc::new(graph));

        let with = expander.expand_candidates(&paths(&["A"]), None, 0, 20);
        assert!(with.contains(&"X".to_string()));

        let without = expander.expand_candidates(&paths(&["A"]), None, 0, 1);
        assert!(!without.contains(&"X".to_string()));
    }

    #[test]
    fn test_expand_candidates_includes_active_note() {
        let graph = MemGraph::new(&[("Active", "Linked")]);
        let expander = GraphExpander::new(Arc::new(graph));
        let result = expander.expand_candidates(&[], Some("Active"), 1, 20);
        assert_eq!(result, vec!["Active", "Linked"]);
    }
}
