//! Triangle search: A → B → C → A

use tracing::info;

use super::cycle::{qualifies, ArbitrageCycle, Engine};
use super::SearchParams;
use crate::cartographer::GraphSnapshot;

pub struct TriangleSearch<'a> {
    graph: &'a GraphSnapshot,
    params: SearchParams,
}

impl<'a> TriangleSearch<'a> {
    pub fn new(graph: &'a GraphSnapshot, params: SearchParams) -> Self {
        Self { graph, params }
    }

    /// Each triangle is reported once, starting from its smallest token
    pub fn find_cycles(&self) -> Vec<ArbitrageCycle> {
        let mut cycles = Vec::new();
        if self.params.max_hops < 3 {
            return cycles;
        }

        for a in self.graph.nodes() {
            for &(b, ab) in self.graph.out_edges(a) {
                if b <= a {
                    continue;
                }
                for &(c, bc) in self.graph.out_edges(b) {
                    if c <= a || c == b {
                        continue;
                    }
                    let Some(ca) = self.graph.find_edge(c, a) else {
                        continue;
                    };

                    let hops = vec![
                        self.graph.edge(ab).clone(),
                        self.graph.edge(bc).clone(),
                        self.graph.edge(ca).clone(),
                    ];
                    let cycle = ArbitrageCycle::new(hops, Engine::Triangle);
                    if qualifies(cycle.log_gain, self.params.threshold) {
                        cycles.push(cycle);
                    }
                }
            }
        }

        info!("Triangle search found {} cycles", cycles.len());
        cycles
    }
}
