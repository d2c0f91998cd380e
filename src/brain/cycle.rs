//! Cycle model shared by every engine

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::cartographer::EdgeData;
use crate::tokens::TokenBook;

/// Margin a cycle must clear on top of the threshold, in log space
pub const PROFIT_EPSILON: f64 = 1e-9;

/// The single profit test every engine uses
///
/// `log_gain` is `ln(net multiplier)`; the cycle qualifies when the
/// multiplier beats `1 + threshold` by more than `PROFIT_EPSILON`.
pub fn qualifies(log_gain: f64, threshold: f64) -> bool {
    log_gain.is_finite() && log_gain > (1.0 + threshold).ln() + PROFIT_EPSILON
}

/// Which search found a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Engine {
    BellmanFord,
    Triangle,
    TwoHop,
    Dfs,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::BellmanFord => write!(f, "bellman-ford"),
            Engine::Triangle => write!(f, "triangle"),
            Engine::TwoHop => write!(f, "two-hop"),
            Engine::Dfs => write!(f, "dfs"),
        }
    }
}

/// A closed sequence of swaps
#[derive(Debug, Clone)]
pub struct ArbitrageCycle {
    pub hops: Vec<EdgeData>,
    /// `ln` of the net multiplier
    pub log_gain: f64,
    pub engine: Engine,
}

impl ArbitrageCycle {
    pub fn new(hops: Vec<EdgeData>, engine: Engine) -> Self {
        let log_gain = hops.iter().map(EdgeData::log_gain).sum();
        Self { hops, log_gain, engine }
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Tokens visited, closing token included
    pub fn path(&self) -> Vec<Address> {
        let mut path: Vec<Address> = self.hops.iter().map(|h| h.from).collect();
        if let Some(first) = self.hops.first() {
            path.push(first.from);
        }
        path
    }

    pub fn start_token(&self) -> Option<Address> {
        self.hops.first().map(|h| h.from)
    }

    /// Product of quoted rates, fees ignored
    pub fn gross_rate(&self) -> f64 {
        self.hops.iter().map(|h| h.rate).product()
    }

    /// Product of `rate × (1 - fee)`
    pub fn net_multiplier(&self) -> f64 {
        self.log_gain.exp()
    }

    pub fn profit_percentage(&self) -> f64 {
        (self.net_multiplier() - 1.0) * 100.0
    }

    pub fn total_gas(&self) -> u64 {
        self.hops.iter().map(|h| h.gas).sum()
    }

    /// Thinnest hop
    pub fn bottleneck_liquidity(&self) -> f64 {
        self.hops
            .iter()
            .map(|h| h.liquidity)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn oldest_quote(&self) -> Option<DateTime<Utc>> {
        self.hops.iter().map(|h| h.observed_at).min()
    }

    pub fn contains_token(&self, token: &Address) -> bool {
        self.hops.iter().any(|h| h.from == *token)
    }

    /// Structural check: closed, chained, simple
    pub fn is_valid(&self) -> bool {
        if self.hops.len() < 2 {
            return false;
        }

        for pair in self.hops.windows(2) {
            if pair[0].to != pair[1].from {
                return false;
            }
        }

        let (Some(first), Some(last)) = (self.hops.first(), self.hops.last()) else {
            return false;
        };
        if last.to != first.from {
            return false;
        }

        if self.hops.iter().any(|h| h.from == h.to) {
            return false;
        }

        let unique: HashSet<_> = self.hops.iter().map(|h| h.from).collect();
        if unique.len() != self.hops.len() {
            debug!("Cycle revisits a token - invalid");
            return false;
        }

        self.log_gain.is_finite()
    }

    /// Same cycle rotated to start at its smallest token, direction kept
    pub fn canonical(&self) -> Self {
        let start = self
            .hops
            .iter()
            .enumerate()
            .min_by_key(|(_, h)| h.from)
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut hops = self.hops.clone();
        hops.rotate_left(start);
        Self {
            hops,
            log_gain: self.log_gain,
            engine: self.engine,
        }
    }

    /// Same cycle rotated to start at `token`, if it passes through it
    pub fn rotated_to(&self, token: Address) -> Option<Self> {
        let start = self.hops.iter().position(|h| h.from == token)?;
        let mut hops = self.hops.clone();
        hops.rotate_left(start);
        Some(Self {
            hops,
            log_gain: self.log_gain,
            engine: self.engine,
        })
    }

    /// Identity of the cycle regardless of starting point
    pub fn key(&self) -> Vec<Address> {
        let mut path = self.canonical().path();
        path.pop();
        path
    }

    pub fn format_path(&self, tokens: &TokenBook) -> String {
        tokens.format_path(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::graph::tests::{quote, t0};
    use chrono::Duration;

    fn edge(from: u8, to: u8, rate: f64) -> EdgeData {
        EdgeData::from_quote(&quote(from, to, rate), t0(), Duration::seconds(60)).unwrap()
    }

    #[test]
    fn test_qualifies_guards_break_even() {
        assert!(!qualifies(0.0, 0.0));
        assert!(!qualifies(1.005f64.ln(), 0.005));
        assert!(qualifies(1.006f64.ln(), 0.005));
        assert!(!qualifies(f64::NAN, 0.0));
    }

    #[test]
    fn test_cycle_validation() {
        let valid = ArbitrageCycle::new(
            vec![edge(1, 2, 1.0), edge(2, 3, 1.0), edge(3, 1, 1.01)],
            Engine::Triangle,
        );
        assert!(valid.is_valid());
        assert_eq!(valid.path().first(), valid.path().last());

        // Visits token 2 twice
        let revisit = ArbitrageCycle::new(
            vec![edge(1, 2, 1.0), edge(2, 3, 1.0), edge(3, 2, 1.0), edge(2, 1, 1.65)],
            Engine::Dfs,
        );
        assert!(!revisit.is_valid());

        let open = ArbitrageCycle::new(vec![edge(1, 2, 1.0), edge(2, 3, 1.0)], Engine::Dfs);
        assert!(!open.is_valid());
    }

    #[test]
    fn test_canonical_rotation_invariant() {
        let a = ArbitrageCycle::new(
            vec![edge(3, 1, 1.0), edge(1, 2, 1.0), edge(2, 3, 1.02)],
            Engine::BellmanFord,
        );
        let b = ArbitrageCycle::new(
            vec![edge(2, 3, 1.02), edge(3, 1, 1.0), edge(1, 2, 1.0)],
            Engine::Dfs,
        );

        assert_eq!(a.key(), b.key());
        assert_eq!(a.canonical().start_token(), Some(Address::repeat_byte(1)));

        // Opposite direction is a different cycle
        let reversed = ArbitrageCycle::new(
            vec![edge(1, 3, 1.0), edge(3, 2, 1.0), edge(2, 1, 1.02)],
            Engine::Dfs,
        );
        assert_ne!(a.key(), reversed.key());
    }

    #[test]
    fn test_multiplier_and_bottleneck() {
        let mut low = quote(2, 1, 1.0);
        low.quote.liquidity = 50.0;
        let cycle = ArbitrageCycle::new(
            vec![
                edge(1, 2, 2.0),
                EdgeData::from_quote(&low, t0(), Duration::seconds(60)).unwrap(),
            ],
            Engine::TwoHop,
        );
        assert!((cycle.net_multiplier() - 2.0).abs() < 1e-12);
        assert_eq!(cycle.bottleneck_liquidity(), 50.0);
        assert_eq!(cycle.total_gas(), 10_000);
    }
}
