//! Directed acyclic graph of water sources.
//!
//! Edges point downstream: an edge `(a, b)` means source `a` spills into
//! source `b`. The graph is immutable after construction; the topological
//! order is computed once with Kahn's algorithm and cached, and the weekly
//! mass balance walks it from headwaters down.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Immutable adjacency and ordering information for the source network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceGraph {
    n_sources: usize,
    /// Upstream neighbors per source (edges arriving from upstream).
    upstream: Vec<Vec<usize>>,
    /// Downstream neighbors per source.
    downstream: Vec<Vec<usize>>,
    /// Every source id exactly once, upstream before downstream.
    topological_order: Vec<usize>,
}

impl SourceGraph {
    /// Build the graph from a downstream-pointing edge list.
    ///
    /// Fails with [`ConfigError::CyclicSourceGraph`] if the edges contain a
    /// cycle and [`ConfigError::UnknownSource`] if an edge references an id
    /// outside `0..n_sources`.
    pub fn new(n_sources: usize, edges: &[(usize, usize)]) -> Result<Self, ConfigError> {
        let mut upstream = vec![Vec::new(); n_sources];
        let mut downstream = vec![Vec::new(); n_sources];

        for &(from, to) in edges {
            if from >= n_sources {
                return Err(ConfigError::UnknownSource(from));
            }
            if to >= n_sources {
                return Err(ConfigError::UnknownSource(to));
            }
            upstream[to].push(from);
            downstream[from].push(to);
        }

        // Kahn's algorithm. Candidate queue kept in ascending id order so
        // the resulting order is deterministic for a given edge list.
        let mut in_degree: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut ready: Vec<usize> = (0..n_sources).filter(|&i| in_degree[i] == 0).collect();
        ready.sort_unstable_by(|a, b| b.cmp(a));
        let mut topological_order = Vec::with_capacity(n_sources);

        while let Some(id) = ready.pop() {
            topological_order.push(id);
            for &down in &downstream[id] {
                in_degree[down] -= 1;
                if in_degree[down] == 0 {
                    ready.push(down);
                }
            }
            ready.sort_unstable_by(|a, b| b.cmp(a));
        }

        if topological_order.len() != n_sources {
            // Any node still holding in-degree is on (or downstream of) a cycle.
            let stuck = in_degree
                .iter()
                .position(|&d| d > 0)
                .expect("incomplete order implies a positive in-degree");
            return Err(ConfigError::CyclicSourceGraph(stuck));
        }

        Ok(Self {
            n_sources,
            upstream,
            downstream,
            topological_order,
        })
    }

    /// Number of sources in the network.
    pub fn len(&self) -> usize {
        self.n_sources
    }

    /// True when the network has no sources.
    pub fn is_empty(&self) -> bool {
        self.n_sources == 0
    }

    /// Every source id exactly once, upstream before downstream.
    pub fn topological_order(&self) -> &[usize] {
        &self.topological_order
    }

    /// Sources spilling directly into `id`.
    pub fn upstream(&self, id: usize) -> &[usize] {
        &self.upstream[id]
    }

    /// The first source `id` spills into, if any.
    pub fn first_downstream(&self, id: usize) -> Option<usize> {
        self.downstream[id].first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_chain_order() {
        // 0 -> 1 -> 2
        let graph = SourceGraph::new(3, &[(0, 1), (1, 2)]).unwrap();
        assert_eq!(graph.topological_order(), &[0, 1, 2]);
        assert_eq!(graph.upstream(0), &[] as &[usize]);
        assert_eq!(graph.upstream(1), &[0]);
        assert_eq!(graph.upstream(2), &[1]);
        assert_eq!(graph.first_downstream(0), Some(1));
        assert_eq!(graph.first_downstream(2), None);
    }

    #[test]
    fn test_confluence_orders_upstream_first() {
        // 0 and 1 both feed 2; 2 feeds 3.
        let graph = SourceGraph::new(4, &[(0, 2), (1, 2), (2, 3)]).unwrap();
        let order = graph.topological_order();
        let pos = |id: usize| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_every_id_appears_exactly_once() {
        let graph = SourceGraph::new(5, &[(0, 3), (1, 3), (3, 4), (2, 4)]).unwrap();
        let mut seen = vec![false; 5];
        for &id in graph.topological_order() {
            assert!(!seen[id], "id {id} appeared twice");
            seen[id] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_edge_precedence_holds_for_all_edges() {
        let edges = [(0, 2), (1, 2), (2, 5), (3, 5), (4, 3)];
        let graph = SourceGraph::new(6, &edges).unwrap();
        let order = graph.topological_order();
        let pos = |id: usize| order.iter().position(|&x| x == id).unwrap();
        for (from, to) in edges {
            assert!(pos(from) < pos(to), "edge ({from}, {to}) out of order");
        }
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = SourceGraph::new(3, &[(0, 1), (1, 2), (2, 0)]).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicSourceGraph(_)));
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let err = SourceGraph::new(2, &[(1, 1)]).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicSourceGraph(1)));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let err = SourceGraph::new(2, &[(0, 7)]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSource(7)));
    }

    #[test]
    fn test_isolated_sources_are_ordered() {
        let graph = SourceGraph::new(3, &[]).unwrap();
        assert_eq!(graph.topological_order().len(), 3);
        for id in 0..3 {
            assert_eq!(graph.first_downstream(id), None);
        }
    }

    #[test]
    fn test_order_is_deterministic() {
        let edges = [(0, 4), (1, 4), (2, 5), (3, 5), (4, 6), (5, 6)];
        let a = SourceGraph::new(7, &edges).unwrap();
        let b = SourceGraph::new(7, &edges).unwrap();
        assert_eq!(a.topological_order(), b.topological_order());
    }
}
