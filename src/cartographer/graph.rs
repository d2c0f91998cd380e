//! Graph Construction
//!
//! Quotes become directed edges weighted by `-ln(rate × (1 - fee))`, so a
//! cycle is profitable exactly when its weights sum below zero.
//!
//! `ArbitrageGraph` is the long-lived cache that quotes are merged into.
//! Engines never see it directly: each pass takes an immutable
//! `GraphSnapshot` holding only the edges that are fresh at `as_of`.

use alloy_primitives::Address;
use chrono::{DateTime, Duration, Utc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::quote::PairQuote;
use crate::errors::ValidationError;

/// Edge data in our arbitrage graph
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub from: Address,
    pub to: Address,
    pub rate: f64,
    pub fee: f64,
    pub liquidity: f64,
    pub gas: u64,
    pub observed_at: DateTime<Utc>,
    /// `-ln(rate × (1 - fee))`
    pub weight: f64,
}

impl EdgeData {
    /// Validate a quote against the graph's sanity rules
    pub fn from_quote(
        pair: &PairQuote,
        as_of: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, ValidationError> {
        let (from, to) = (pair.from, pair.to);
        let q = &pair.quote;

        if from == to {
            return Err(ValidationError::SelfLoop { token: from });
        }
        if !q.rate.is_finite() {
            return Err(ValidationError::NonFiniteRate { from, to });
        }
        if q.rate <= 0.0 {
            return Err(ValidationError::NonPositiveRate { from, to, rate: q.rate });
        }
        if !(0.0..1.0).contains(&q.fee) {
            return Err(ValidationError::FeeOutOfRange { from, to, fee: q.fee });
        }
        if !q.liquidity.is_finite() || q.liquidity <= 0.0 {
            return Err(ValidationError::NoLiquidity { from, to });
        }
        if is_stale(q.observed_at, as_of, ttl) {
            return Err(ValidationError::Stale {
                from,
                to,
                age_secs: (as_of - q.observed_at).num_seconds(),
            });
        }

        let effective = q.rate * (1.0 - q.fee);
        let weight = -effective.ln();
        if !weight.is_finite() {
            return Err(ValidationError::NonFiniteRate { from, to });
        }

        Ok(Self {
            from,
            to,
            rate: q.rate,
            fee: q.fee,
            liquidity: q.liquidity,
            gas: q.gas,
            observed_at: q.observed_at,
            weight,
        })
    }

    /// Log-space gain of this hop (`-weight`)
    pub fn log_gain(&self) -> f64 {
        -self.weight
    }
}

fn is_stale(observed_at: DateTime<Utc>, as_of: DateTime<Utc>, ttl: Duration) -> bool {
    as_of - observed_at > ttl
}

/// Counters for one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub inserted: usize,
    pub replaced: usize,
    /// Older than the edge already cached for the same pair
    pub superseded: usize,
    pub rejected: usize,
}

/// The long-lived quote cache
pub struct ArbitrageGraph {
    pub graph: DiGraph<Address, EdgeData>,
    pub token_to_node: HashMap<Address, NodeIndex>,
}

impl ArbitrageGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            token_to_node: HashMap::new(),
        }
    }

    pub fn from_quotes(quotes: &[PairQuote], as_of: DateTime<Utc>, ttl: Duration) -> Self {
        let mut graph = Self::new();
        graph.merge(quotes, as_of, ttl);
        graph
    }

    /// Merge a batch of quotes, replacing older edges for the same pair
    pub fn merge(&mut self, quotes: &[PairQuote], as_of: DateTime<Utc>, ttl: Duration) -> BuildStats {
        let mut stats = BuildStats::default();

        for quote in quotes {
            match EdgeData::from_quote(quote, as_of, ttl) {
                Ok(edge) => self.upsert(edge, &mut stats),
                Err(e) => {
                    warn!("Dropping quote: {}", e);
                    stats.rejected += 1;
                }
            }
        }

        info!(
            "Graph merged: {} Nodes, {} Edges ({} new, {} replaced, {} rejected)",
            self.graph.node_count(),
            self.graph.edge_count(),
            stats.inserted,
            stats.replaced,
            stats.rejected
        );

        stats
    }

    fn upsert(&mut self, edge: EdgeData, stats: &mut BuildStats) {
        let source = self.get_or_create_node(edge.from);
        let target = self.get_or_create_node(edge.to);

        match self.graph.find_edge(source, target) {
            Some(existing) if self.graph[existing].observed_at > edge.observed_at => {
                debug!("Ignoring older quote for {:?} -> {:?}", edge.from, edge.to);
                stats.superseded += 1;
            }
            Some(existing) => {
                self.graph[existing] = edge;
                stats.replaced += 1;
            }
            None => {
                self.graph.add_edge(source, target, edge);
                stats.inserted += 1;
            }
        }
    }

    fn get_or_create_node(&mut self, token: Address) -> NodeIndex {
        if let Some(&node) = self.token_to_node.get(&token) {
            return node;
        }

        let node = self.graph.add_node(token);
        self.token_to_node.insert(token, node);
        node
    }

    pub fn get_node(&self, token: Address) -> Option<NodeIndex> {
        self.token_to_node.get(&token).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Freeze the edges that are fresh at `as_of`
    pub fn snapshot(&self, as_of: DateTime<Utc>, ttl: Duration) -> GraphSnapshot {
        let fresh: Vec<EdgeData> = self
            .graph
            .edge_references()
            .map(|e| e.weight())
            .filter(|e| !is_stale(e.observed_at, as_of, ttl))
            .cloned()
            .collect();

        let inert = self.graph.edge_count() - fresh.len();
        if inert > 0 {
            debug!("{} cached edges are stale at {} and stay out of the snapshot", inert, as_of);
        }

        GraphSnapshot::from_edges(fresh, as_of)
    }
}

impl Default for ArbitrageGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// FROZEN SNAPSHOT
// ============================================

/// Read-only graph shared by every engine in one pass
///
/// Node indices follow token address order and each adjacency list is
/// ordered by target, so comparing two `NodeIndex` values compares the
/// tokens and every traversal is deterministic.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    graph: DiGraph<Address, EdgeData>,
    adjacency: Vec<Vec<(NodeIndex, EdgeIndex)>>,
    best_log_gain: f64,
    as_of: DateTime<Utc>,
}

impl GraphSnapshot {
    /// Build from already-validated edges; at most one edge per ordered pair is kept
    pub fn from_edges(mut edges: Vec<EdgeData>, as_of: DateTime<Utc>) -> Self {
        edges.sort_by(|a, b| {
            (a.from, a.to)
                .cmp(&(b.from, b.to))
                .then(b.observed_at.cmp(&a.observed_at))
        });
        edges.dedup_by(|later, earlier| later.from == earlier.from && later.to == earlier.to);

        let mut tokens: Vec<Address> = edges.iter().flat_map(|e| [e.from, e.to]).collect();
        tokens.sort();
        tokens.dedup();

        let mut graph = DiGraph::with_capacity(tokens.len(), edges.len());
        let mut index = HashMap::with_capacity(tokens.len());
        for token in &tokens {
            index.insert(*token, graph.add_node(*token));
        }

        let mut adjacency = vec![Vec::new(); tokens.len()];
        let mut best_log_gain = f64::NEG_INFINITY;
        for edge in edges {
            let (Some(&source), Some(&target)) = (index.get(&edge.from), index.get(&edge.to)) else {
                continue;
            };
            best_log_gain = best_log_gain.max(edge.log_gain());
            let id = graph.add_edge(source, target, edge);
            adjacency[source.index()].push((target, id));
        }

        Self {
            graph,
            adjacency,
            best_log_gain,
            as_of,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Largest single-edge log gain; `-inf` for an empty graph
    pub fn best_log_gain(&self) -> f64 {
        self.best_log_gain
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn token(&self, node: NodeIndex) -> Address {
        self.graph[node]
    }

    pub fn node_of(&self, token: Address) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&n| self.graph[n] == token)
    }

    /// Outgoing `(target, edge)` pairs ordered by target
    pub fn out_edges(&self, node: NodeIndex) -> &[(NodeIndex, EdgeIndex)] {
        &self.adjacency[node.index()]
    }

    pub fn edge(&self, edge: EdgeIndex) -> &EdgeData {
        &self.graph[edge]
    }

    pub fn find_edge(&self, from: NodeIndex, to: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(from, to)
    }

    /// Every edge as `(source, target, edge)` in index order
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, EdgeIndex)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.id()))
    }

    /// Source node of an edge
    pub fn source(&self, edge: EdgeIndex) -> Option<NodeIndex> {
        self.graph.edge_endpoints(edge).map(|(s, _)| s)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cartographer::quote::Quote;
    use chrono::TimeZone;

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    pub(crate) fn token(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    pub(crate) fn quote(from: u8, to: u8, rate: f64) -> PairQuote {
        quote_at(from, to, rate, t0())
    }

    pub(crate) fn quote_at(from: u8, to: u8, rate: f64, at: DateTime<Utc>) -> PairQuote {
        PairQuote::new(
            token(from),
            token(to),
            Quote { rate, fee: 0.0, gas: 5_000, liquidity: 1_000_000.0, observed_at: at },
        )
    }

    /// Snapshot straight from quotes with a generous TTL
    pub(crate) fn snapshot_of(quotes: &[PairQuote]) -> GraphSnapshot {
        ArbitrageGraph::from_quotes(quotes, t0(), Duration::seconds(60)).snapshot(t0(), Duration::seconds(60))
    }

    #[test]
    fn test_invalid_quotes_rejected() {
        let mut bad_fee = quote(1, 2, 1.0);
        bad_fee.quote.fee = 1.0;
        let mut no_liquidity = quote(2, 3, 1.0);
        no_liquidity.quote.liquidity = 0.0;

        let quotes = vec![
            quote(1, 2, 0.0),
            quote(1, 2, f64::NAN),
            quote(3, 3, 1.0),
            bad_fee,
            no_liquidity,
            quote(1, 3, 2.0),
        ];
        let mut graph = ArbitrageGraph::new();
        let stats = graph.merge(&quotes, t0(), Duration::seconds(60));

        assert_eq!(stats.rejected, 5);
        assert_eq!(stats.inserted, 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_weight_is_negative_log_of_effective_rate() {
        let mut q = quote(1, 2, 2.0);
        q.quote.fee = 0.5;
        let edge = EdgeData::from_quote(&q, t0(), Duration::seconds(60)).unwrap();
        assert!(edge.weight.abs() < 1e-12);
    }

    #[test]
    fn test_replace_by_key_keeps_newest() {
        let mut graph = ArbitrageGraph::new();
        graph.merge(&[quote(1, 2, 1.0)], t0(), Duration::seconds(60));

        let newer = quote_at(1, 2, 1.5, t0() + Duration::seconds(5));
        let stats = graph.merge(&[newer], t0() + Duration::seconds(5), Duration::seconds(60));
        assert_eq!(stats.replaced, 1);
        assert_eq!(graph.edge_count(), 1);

        let older = quote_at(1, 2, 9.0, t0() - Duration::seconds(5));
        let stats = graph.merge(&[older], t0() + Duration::seconds(5), Duration::seconds(60));
        assert_eq!(stats.superseded, 1);

        let edge = graph.graph.edge_weights().next().unwrap();
        assert_eq!(edge.rate, 1.5);
    }

    #[test]
    fn test_stale_edges_stay_cached_but_inert() {
        let mut graph = ArbitrageGraph::new();
        graph.merge(&[quote(1, 2, 1.0), quote(2, 1, 1.0)], t0(), Duration::seconds(30));
        let later = t0() + Duration::seconds(20);
        graph.merge(&[quote_at(2, 3, 1.0, later)], later, Duration::seconds(30));

        let snapshot = graph.snapshot(t0() + Duration::seconds(45), Duration::seconds(30));
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(snapshot.edge_count(), 1);
    }

    #[test]
    fn test_stale_quote_rejected_at_merge() {
        let mut graph = ArbitrageGraph::new();
        let old = quote_at(1, 2, 1.0, t0() - Duration::seconds(120));
        let stats = graph.merge(&[old], t0(), Duration::seconds(60));
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let snapshot = snapshot_of(&[quote(9, 1, 1.0), quote(1, 9, 1.0), quote(1, 5, 1.0)]);
        let tokens: Vec<Address> = snapshot.nodes().map(|n| snapshot.token(n)).collect();
        assert_eq!(tokens, vec![token(1), token(5), token(9)]);

        let first = snapshot.node_of(token(1)).unwrap();
        let targets: Vec<Address> = snapshot
            .out_edges(first)
            .iter()
            .map(|(t, _)| snapshot.token(*t))
            .collect();
        assert_eq!(targets, vec![token(5), token(9)]);
    }

    #[test]
    fn test_best_log_gain() {
        let snapshot = snapshot_of(&[quote(1, 2, 2.0), quote(2, 1, 0.25)]);
        assert!((snapshot.best_log_gain() - 2f64.ln()).abs() < 1e-12);
    }
}
