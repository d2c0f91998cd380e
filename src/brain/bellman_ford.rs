//! Bellman-Ford negative-cycle detection
//!
//! A virtual source joined to every node by zero-weight edges is modelled by
//! starting every distance at zero, so one run covers the whole graph.
//! After |V| rounds any edge that still relaxes sits downstream of a
//! negative cycle; walking predecessors from it lands on that cycle.

use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::HashSet;
use tracing::{debug, info};

use super::cycle::{qualifies, ArbitrageCycle, Engine};
use super::SearchParams;
use crate::cartographer::GraphSnapshot;

/// Relaxations smaller than this are float noise
const RELAX_EPSILON: f64 = 1e-12;

pub struct BellmanFord<'a> {
    graph: &'a GraphSnapshot,
    params: SearchParams,
}

impl<'a> BellmanFord<'a> {
    pub fn new(graph: &'a GraphSnapshot, params: SearchParams) -> Self {
        Self { graph, params }
    }

    pub fn find_cycles(&self) -> Vec<ArbitrageCycle> {
        let n = self.graph.node_count();
        if n == 0 {
            return Vec::new();
        }

        let mut dist = vec![0.0f64; n];
        let mut pred: Vec<Option<EdgeIndex>> = vec![None; n];

        let mut converged = false;
        for round in 0..n {
            let mut relaxed = false;
            for (source, target, edge) in self.graph.edges() {
                let candidate = dist[source.index()] + self.graph.edge(edge).weight;
                if candidate < dist[target.index()] - RELAX_EPSILON {
                    dist[target.index()] = candidate;
                    pred[target.index()] = Some(edge);
                    relaxed = true;
                }
            }
            if !relaxed {
                debug!("Bellman-Ford converged after {} rounds", round + 1);
                converged = true;
                break;
            }
        }

        if converged {
            return Vec::new();
        }

        let mut cycles = Vec::new();
        let mut seen: HashSet<Vec<alloy_primitives::Address>> = HashSet::new();

        for (source, target, edge) in self.graph.edges() {
            let candidate = dist[source.index()] + self.graph.edge(edge).weight;
            if candidate >= dist[target.index()] - RELAX_EPSILON {
                continue;
            }

            let Some(cycle) = self.reconstruct(target, &pred) else {
                continue;
            };
            if cycle.hop_count() > self.params.max_hops
                || !qualifies(cycle.log_gain, self.params.threshold)
                || !cycle.is_valid()
            {
                continue;
            }
            if seen.insert(cycle.key()) {
                cycles.push(cycle);
            }
        }

        info!("Bellman-Ford found {} cycles", cycles.len());
        cycles
    }

    /// Walk predecessors from `seed` onto the cycle, then collect it
    fn reconstruct(&self, seed: NodeIndex, pred: &[Option<EdgeIndex>]) -> Option<ArbitrageCycle> {
        let n = self.graph.node_count();

        let mut node = seed;
        for _ in 0..n {
            let edge = pred[node.index()]?;
            node = self.graph.source(edge)?;
        }

        let start = node;
        let mut edges = Vec::new();
        let mut current = start;
        loop {
            let edge = pred[current.index()]?;
            edges.push(edge);
            current = self.graph.source(edge)?;
            if current == start {
                break;
            }
            if edges.len() > n {
                return None;
            }
        }

        edges.reverse();
        let hops = edges.into_iter().map(|e| self.graph.edge(e).clone()).collect();
        Some(ArbitrageCycle::new(hops, Engine::BellmanFord))
    }
}
