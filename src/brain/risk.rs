//! Risk Evaluator
//!
//! Scores a candidate on four factors, each in [0, 1]:
//!
//! - liquidity:  `bottleneck / (amount × liquidity_multiple)`
//! - complexity: `hop_decay ^ (hops - 2)`
//! - gas:        `1 - gas_cost / gross_profit` (0 when there is no gross profit)
//! - freshness:  `1 - oldest_quote_age / ttl`
//!
//! Confidence is the weighted mean of the factors. Everything is computed
//! from the inputs alone, including the `as_of` instant, so the same input
//! always scores the same.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::cycle::ArbitrageCycle;

/// Factor weights; they need not sum to one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub liquidity: f64,
    pub gas: f64,
    pub complexity: f64,
    pub freshness: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            liquidity: 0.35,
            gas: 0.30,
            complexity: 0.20,
            freshness: 0.15,
        }
    }
}

impl RiskWeights {
    fn total(&self) -> f64 {
        self.liquidity + self.gas + self.complexity + self.freshness
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub weights: RiskWeights,
    /// Per-hop multiplier on the complexity factor beyond two hops
    pub hop_decay: f64,
    /// Bottleneck depth needed, as a multiple of the trade, for full marks
    pub liquidity_multiple: f64,
    pub quote_ttl: Duration,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            hop_decay: 0.9,
            liquidity_multiple: 100.0,
            quote_ttl: Duration::seconds(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Everything the evaluator looks at
#[derive(Debug, Clone, Copy)]
pub struct RiskInput {
    pub hop_count: usize,
    pub bottleneck_liquidity: f64,
    pub trade_amount: f64,
    pub gross_profit: f64,
    pub gas_cost: f64,
    pub oldest_quote: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
}

impl RiskInput {
    pub fn for_cycle(
        cycle: &ArbitrageCycle,
        trade_amount: f64,
        gross_profit: f64,
        gas_cost: f64,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            hop_count: cycle.hop_count(),
            bottleneck_liquidity: cycle.bottleneck_liquidity(),
            trade_amount,
            gross_profit,
            gas_cost,
            oldest_quote: cycle.oldest_quote().unwrap_or(as_of),
            as_of,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub liquidity_score: f64,
    pub complexity_score: f64,
    pub gas_score: f64,
    pub freshness_score: f64,
    pub confidence: f64,
    pub level: RiskLevel,
    pub accepted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RiskEvaluator {
    params: RiskParams,
}

impl RiskEvaluator {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn evaluate(&self, input: &RiskInput, min_confidence: f64) -> RiskAssessment {
        let p = &self.params;

        let needed = input.trade_amount * p.liquidity_multiple;
        let liquidity_score = if needed > 0.0 {
            clamp01(input.bottleneck_liquidity / needed)
        } else {
            1.0
        };

        let extra_hops = input.hop_count.saturating_sub(2) as i32;
        let complexity_score = clamp01(p.hop_decay.powi(extra_hops));

        let gas_score = if input.gross_profit > 0.0 {
            clamp01(1.0 - input.gas_cost / input.gross_profit)
        } else {
            0.0
        };

        let ttl_secs = p.quote_ttl.num_milliseconds() as f64 / 1000.0;
        let age_secs = (input.as_of - input.oldest_quote).num_milliseconds().max(0) as f64 / 1000.0;
        let freshness_score = if ttl_secs > 0.0 {
            clamp01(1.0 - age_secs / ttl_secs)
        } else {
            0.0
        };

        let w = &p.weights;
        let total = w.total();
        let confidence = if total > 0.0 {
            clamp01(
                (w.liquidity * liquidity_score
                    + w.gas * gas_score
                    + w.complexity * complexity_score
                    + w.freshness * freshness_score)
                    / total,
            )
        } else {
            0.0
        };

        RiskAssessment {
            liquidity_score,
            complexity_score,
            gas_score,
            freshness_score,
            confidence,
            level: risk_level(confidence),
            accepted: confidence >= min_confidence,
        }
    }
}

/// Label from `1 - confidence`: below 0.3 is low, below 0.6 medium
pub fn risk_level(confidence: f64) -> RiskLevel {
    let risk = 1.0 - confidence;
    if risk < 0.3 {
        RiskLevel::Low
    } else if risk < 0.6 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input(hops: usize) -> RiskInput {
        let as_of = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        RiskInput {
            hop_count: hops,
            bottleneck_liquidity: 500.0,
            trade_amount: 10.0,
            gross_profit: 0.5,
            gas_cost: 0.1,
            oldest_quote: as_of - Duration::seconds(6),
            as_of,
        }
    }

    #[test]
    fn test_factor_values() {
        let a = RiskEvaluator::default().evaluate(&input(3), 0.5);
        assert!((a.liquidity_score - 0.5).abs() < 1e-12);
        assert!((a.complexity_score - 0.9).abs() < 1e-12);
        assert!((a.gas_score - 0.8).abs() < 1e-12);
        assert!((a.freshness_score - 0.8).abs() < 1e-12);

        let expected = 0.35 * 0.5 + 0.30 * 0.8 + 0.20 * 0.9 + 0.15 * 0.8;
        assert!((a.confidence - expected).abs() < 1e-12);
        assert!(a.accepted);
    }

    #[test]
    fn test_confidence_non_increasing_in_hops() {
        let evaluator = RiskEvaluator::default();
        let mut previous = f64::INFINITY;
        for hops in 2..=8 {
            let c = evaluator.evaluate(&input(hops), 0.0).confidence;
            assert!(c <= previous, "{} hops scored {} after {}", hops, c, previous);
            previous = c;
        }
    }

    #[test]
    fn test_no_gross_profit_zeroes_gas_factor() {
        let mut i = input(2);
        i.gross_profit = -1.0;
        let a = RiskEvaluator::default().evaluate(&i, 0.0);
        assert_eq!(a.gas_score, 0.0);
    }

    #[test]
    fn test_stale_quote_zeroes_freshness() {
        let mut i = input(2);
        i.oldest_quote = i.as_of - Duration::seconds(300);
        let a = RiskEvaluator::default().evaluate(&i, 0.0);
        assert_eq!(a.freshness_score, 0.0);
    }

    #[test]
    fn test_threshold_rejects() {
        let a = RiskEvaluator::default().evaluate(&input(5), 0.99);
        assert!(!a.accepted);
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(risk_level(0.9), RiskLevel::Low);
        assert_eq!(risk_level(0.5), RiskLevel::Medium);
        assert_eq!(risk_level(0.2), RiskLevel::High);
    }

    #[test]
    fn test_deterministic() {
        let evaluator = RiskEvaluator::default();
        assert_eq!(evaluator.evaluate(&input(4), 0.5), evaluator.evaluate(&input(4), 0.5));
    }
}
