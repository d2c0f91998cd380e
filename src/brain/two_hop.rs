//! Round trips: base → X → base

use tracing::info;

use super::cycle::{qualifies, ArbitrageCycle, Engine};
use super::SearchParams;
use crate::cartographer::GraphSnapshot;

pub struct TwoHopSearch<'a> {
    graph: &'a GraphSnapshot,
    params: SearchParams,
}

impl<'a> TwoHopSearch<'a> {
    pub fn new(graph: &'a GraphSnapshot, params: SearchParams) -> Self {
        Self { graph, params }
    }

    pub fn find_cycles(&self) -> Vec<ArbitrageCycle> {
        let mut cycles = Vec::new();
        if self.params.max_hops < 2 {
            return cycles;
        }

        for base in self.graph.nodes() {
            for &(x, out) in self.graph.out_edges(base) {
                if x <= base {
                    continue;
                }
                let Some(back) = self.graph.find_edge(x, base) else {
                    continue;
                };

                let hops = vec![self.graph.edge(out).clone(), self.graph.edge(back).clone()];
                let cycle = ArbitrageCycle::new(hops, Engine::TwoHop);
                if qualifies(cycle.log_gain, self.params.threshold) {
                    cycles.push(cycle);
                }
            }
        }

        info!("Two-hop search found {} cycles", cycles.len());
        cycles
    }
}
