//! Exhaustive depth-bounded search
//!
//! Enumerates every simple cycle up to `max_depth` hops. Cycles are only
//! grown from their smallest token, so each one is reported exactly once.
//! The search keeps its own stack of frames instead of recursing.

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::{debug, info};

use super::cycle::{qualifies, ArbitrageCycle, Engine};
use super::SearchParams;
use crate::cartographer::GraphSnapshot;

/// Counters for one search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DfsStats {
    pub paths_explored: usize,
    pub paths_pruned: usize,
    pub cycles_found: usize,
}

struct Frame {
    node: NodeIndex,
    next_edge: usize,
    log_gain: f64,
}

pub struct ExhaustiveSearch<'a> {
    graph: &'a GraphSnapshot,
    params: SearchParams,
    prune: bool,
}

impl<'a> ExhaustiveSearch<'a> {
    /// `params.max_hops` bounds the depth
    pub fn new(graph: &'a GraphSnapshot, params: SearchParams, prune: bool) -> Self {
        Self { graph, params, prune }
    }

    pub fn find_cycles(&self) -> Vec<ArbitrageCycle> {
        self.find_cycles_with_stats().0
    }

    pub fn find_cycles_with_stats(&self) -> (Vec<ArbitrageCycle>, DfsStats) {
        let mut cycles = Vec::new();
        let mut stats = DfsStats::default();

        if self.params.max_hops >= 2 {
            for start in self.graph.nodes() {
                self.search_from(start, &mut cycles, &mut stats);
            }
        }

        debug!(
            "DFS explored {} paths, pruned {}, found {} cycles",
            stats.paths_explored, stats.paths_pruned, stats.cycles_found
        );
        info!("Exhaustive search found {} cycles", cycles.len());
        (cycles, stats)
    }

    fn search_from(&self, start: NodeIndex, cycles: &mut Vec<ArbitrageCycle>, stats: &mut DfsStats) {
        let max_depth = self.params.max_hops;
        let mut on_path = vec![false; self.graph.node_count()];
        let mut path: Vec<EdgeIndex> = Vec::with_capacity(max_depth);
        let mut stack = vec![Frame { node: start, next_edge: 0, log_gain: 0.0 }];
        on_path[start.index()] = true;

        while let Some(frame) = stack.last_mut() {
            let out = self.graph.out_edges(frame.node);
            if frame.next_edge >= out.len() {
                on_path[frame.node.index()] = false;
                stack.pop();
                path.pop();
                continue;
            }

            let (target, edge) = out[frame.next_edge];
            frame.next_edge += 1;
            let gain = frame.log_gain + self.graph.edge(edge).log_gain();
            let depth = path.len() + 1;

            if target == start {
                if depth >= 2 && qualifies(gain, self.params.threshold) {
                    let hops = path
                        .iter()
                        .chain(std::iter::once(&edge))
                        .map(|&e| self.graph.edge(e).clone())
                        .collect();
                    cycles.push(ArbitrageCycle::new(hops, Engine::Dfs));
                    stats.cycles_found += 1;
                }
                continue;
            }

            if target < start || on_path[target.index()] || depth >= max_depth {
                continue;
            }

            if self.prune && !qualifies(gain + self.optimistic_gain(max_depth - depth), self.params.threshold) {
                stats.paths_pruned += 1;
                continue;
            }

            stats.paths_explored += 1;
            on_path[target.index()] = true;
            path.push(edge);
            stack.push(Frame { node: target, next_edge: 0, log_gain: gain });
        }
    }

    /// Best gain any closing of at most `remaining` more hops could add
    fn optimistic_gain(&self, remaining: usize) -> f64 {
        let best = self.graph.best_log_gain();
        if best >= 0.0 {
            best * remaining as f64
        } else {
            best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::graph::tests::{quote, snapshot_of};

    fn square() -> Vec<crate::cartographer::PairQuote> {
        vec![
            quote(1, 2, 1.02),
            quote(2, 3, 1.02),
            quote(3, 4, 1.02),
            quote(4, 1, 1.02),
            quote(2, 1, 0.97),
            quote(3, 1, 0.95),
        ]
    }

    #[test]
    fn test_finds_four_hop_cycle() {
        let snapshot = snapshot_of(&square());
        let cycles = ExhaustiveSearch::new(&snapshot, SearchParams { threshold: 0.005, max_hops: 5 }, false)
            .find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].hop_count(), 4);
        assert!(cycles[0].is_valid());
    }

    #[test]
    fn test_depth_bound() {
        let snapshot = snapshot_of(&square());
        let cycles = ExhaustiveSearch::new(&snapshot, SearchParams { threshold: 0.005, max_hops: 3 }, false)
            .find_cycles();
        assert!(cycles.is_empty());
    }

    #[test]
    fn test_pruning_keeps_results() {
        let mut quotes = square();
        quotes.push(quote(1, 5, 0.5));
        quotes.push(quote(5, 6, 0.5));
        quotes.push(quote(6, 1, 1.01));
        let snapshot = snapshot_of(&quotes);
        let params = SearchParams { threshold: 0.005, max_hops: 5 };

        let (plain, plain_stats) = ExhaustiveSearch::new(&snapshot, params, false).find_cycles_with_stats();
        let (pruned, pruned_stats) = ExhaustiveSearch::new(&snapshot, params, true).find_cycles_with_stats();

        let keys = |c: &[ArbitrageCycle]| c.iter().map(|c| c.key()).collect::<Vec<_>>();
        assert_eq!(keys(&plain), keys(&pruned));
        assert!(pruned_stats.paths_pruned > 0);
        assert!(pruned_stats.paths_explored < plain_stats.paths_explored);
    }
}
