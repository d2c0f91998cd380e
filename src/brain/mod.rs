//! Phase 2: The Brain
//!
//! Responsible for:
//! - Finding profitable cycles with four independent searches
//! - Merging, valuing and ranking what they find
//! - Scoring each candidate for execution risk

pub mod bellman_ford;
pub mod cycle;
pub mod dfs;
pub mod integrator;
pub mod risk;
pub mod triangle;
pub mod two_hop;

pub use bellman_ford::BellmanFord;
pub use cycle::{qualifies, ArbitrageCycle, Engine, PROFIT_EPSILON};
pub use dfs::{DfsStats, ExhaustiveSearch};
pub use integrator::{
    print_opportunities, DetectionReport, DetectionSettings, EngineToggles, Opportunity,
    OpportunityIntegrator, ScanParams,
};
pub use risk::{RiskAssessment, RiskEvaluator, RiskInput, RiskLevel, RiskParams, RiskWeights};
pub use triangle::TriangleSearch;
pub use two_hop::TwoHopSearch;

/// Bounds shared by every engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Minimum fractional profit, e.g. 0.005 for 0.5%
    pub threshold: f64,
    pub max_hops: usize,
}
