//! Opportunity Integrator
//!
//! Runs the four engines side by side on one snapshot, folds their output
//! into canonical opportunities and ranks them.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use console::style;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::bellman_ford::BellmanFord;
use super::cycle::{ArbitrageCycle, Engine};
use super::dfs::ExhaustiveSearch;
use super::risk::{RiskAssessment, RiskEvaluator, RiskInput};
use super::triangle::TriangleSearch;
use super::two_hop::TwoHopSearch;
use super::SearchParams;
use crate::cartographer::GraphSnapshot;
use crate::errors::DetectionError;
use crate::tokens::TokenBook;

/// Which engines take part in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineToggles {
    pub bellman_ford: bool,
    pub triangle: bool,
    pub two_hop: bool,
    pub dfs: bool,
}

impl Default for EngineToggles {
    fn default() -> Self {
        Self {
            bellman_ford: true,
            triangle: true,
            two_hop: true,
            dfs: true,
        }
    }
}

/// Fixed per-process detection settings
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub max_hops: usize,
    pub dfs_max_hops: usize,
    pub dfs_pruning: bool,
    pub engines: EngineToggles,
    /// Keep only cycles touching one of these; empty keeps everything
    pub base_tokens: Vec<Address>,
    /// Converts gas units into base-token units
    pub gas_unit_price: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            max_hops: 5,
            dfs_max_hops: 5,
            dfs_pruning: true,
            engines: EngineToggles::default(),
            base_tokens: Vec::new(),
            gas_unit_price: 1e-9,
        }
    }
}

/// Per-pass parameters chosen by the operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanParams {
    pub threshold: f64,
    pub trade_amount: f64,
    /// Minimum confidence, or `None` with risk evaluation off
    pub min_confidence: Option<f64>,
}

impl ScanParams {
    /// A negative threshold would let losing cycles qualify
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DetectionError::InvalidParams(format!(
                "threshold must be finite and >= 0 (got {})",
                self.threshold
            )));
        }
        if !self.trade_amount.is_finite() || self.trade_amount <= 0.0 {
            return Err(DetectionError::InvalidParams(format!(
                "trade amount must be finite and > 0 (got {})",
                self.trade_amount
            )));
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(DetectionError::InvalidParams(format!(
                    "minimum confidence must be in [0, 1] (got {})",
                    min
                )));
            }
        }
        Ok(())
    }
}

/// A ranked, deduplicated candidate
#[derive(Debug, Clone)]
pub struct Opportunity {
    /// Canonical form, starting at the smallest token
    pub cycle: ArbitrageCycle,
    pub found_by: Vec<Engine>,
    pub trade_amount: f64,
    pub gross_profit: f64,
    pub gas_cost: f64,
    pub net_profit: f64,
    pub risk: Option<RiskAssessment>,
    pub accepted: bool,
}

impl Opportunity {
    pub fn confidence(&self) -> Option<f64> {
        self.risk.map(|r| r.confidence)
    }

    pub fn format_path(&self, tokens: &TokenBook) -> String {
        self.cycle.format_path(tokens)
    }

    pub fn engines_label(&self) -> String {
        self.found_by
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result of one detection pass
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    pub opportunities: Vec<Opportunity>,
    pub raw_candidates: usize,
    pub per_engine: Vec<(Engine, usize)>,
    /// Freshness reference of the snapshot the engines ran on
    pub as_of: DateTime<Utc>,
}

impl DetectionReport {
    pub fn accepted(&self) -> impl Iterator<Item = &Opportunity> {
        self.opportunities.iter().filter(|o| o.accepted)
    }
}

pub struct OpportunityIntegrator {
    settings: DetectionSettings,
    risk: RiskEvaluator,
}

impl OpportunityIntegrator {
    pub fn new(settings: DetectionSettings, risk: RiskEvaluator) -> Self {
        Self { settings, risk }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Run every enabled engine on the snapshot and merge the results
    pub async fn detect(
        &self,
        snapshot: Arc<GraphSnapshot>,
        scan: &ScanParams,
    ) -> Result<DetectionReport, DetectionError> {
        scan.validate()?;
        let engines = self.settings.engines;
        let params = SearchParams {
            threshold: scan.threshold,
            max_hops: self.settings.max_hops,
        };
        let dfs_params = SearchParams {
            threshold: scan.threshold,
            max_hops: self.settings.dfs_max_hops.min(self.settings.max_hops),
        };
        let prune = self.settings.dfs_pruning;

        let bf = spawn_engine(&snapshot, engines.bellman_ford, move |g| {
            BellmanFord::new(g, params).find_cycles()
        });
        let tri = spawn_engine(&snapshot, engines.triangle, move |g| {
            TriangleSearch::new(g, params).find_cycles()
        });
        let two = spawn_engine(&snapshot, engines.two_hop, move |g| {
            TwoHopSearch::new(g, params).find_cycles()
        });
        let dfs = spawn_engine(&snapshot, engines.dfs, move |g| {
            ExhaustiveSearch::new(g, dfs_params, prune).find_cycles()
        });

        let (bf, tri, two, dfs) = tokio::join!(bf, tri, two, dfs);

        let mut per_engine = Vec::with_capacity(4);
        let mut candidates = Vec::new();
        for (engine, joined) in [
            (Engine::BellmanFord, bf),
            (Engine::Triangle, tri),
            (Engine::TwoHop, two),
            (Engine::Dfs, dfs),
        ] {
            let cycles = joined.map_err(|e| DetectionError::EngineFailed {
                engine: engine.to_string(),
                reason: e.to_string(),
            })?;
            per_engine.push((engine, cycles.len()));
            candidates.extend(cycles);
        }

        let raw_candidates = candidates.len();
        let opportunities = self.integrate(candidates, scan, snapshot.as_of());

        info!(
            "Detection pass: {} candidates -> {} unique opportunities ({} accepted)",
            raw_candidates,
            opportunities.len(),
            opportunities.iter().filter(|o| o.accepted).count()
        );

        Ok(DetectionReport {
            opportunities,
            raw_candidates,
            per_engine,
            as_of: snapshot.as_of(),
        })
    }

    /// Canonicalize, deduplicate, value, score and rank candidate cycles
    pub fn integrate(
        &self,
        candidates: Vec<ArbitrageCycle>,
        scan: &ScanParams,
        as_of: DateTime<Utc>,
    ) -> Vec<Opportunity> {
        let mut merged: BTreeMap<Vec<Address>, (ArbitrageCycle, Vec<Engine>)> = BTreeMap::new();

        for cycle in candidates {
            if !cycle.is_valid() || cycle.hop_count() > self.settings.max_hops {
                debug!("Discarding malformed {} candidate", cycle.engine);
                continue;
            }
            if !self.touches_base_token(&cycle) {
                continue;
            }

            let canonical = cycle.canonical();
            let engine = canonical.engine;
            merged
                .entry(canonical.key())
                .and_modify(|(_, engines)| {
                    if !engines.contains(&engine) {
                        engines.push(engine);
                    }
                })
                .or_insert((canonical, vec![engine]));
        }

        let mut opportunities: Vec<Opportunity> = merged
            .into_values()
            .map(|(cycle, mut found_by)| {
                found_by.sort();
                self.value(cycle, found_by, scan, as_of)
            })
            .collect();

        opportunities.sort_by(rank);
        opportunities
    }

    fn touches_base_token(&self, cycle: &ArbitrageCycle) -> bool {
        self.settings.base_tokens.is_empty()
            || self.settings.base_tokens.iter().any(|t| cycle.contains_token(t))
    }

    fn value(
        &self,
        cycle: ArbitrageCycle,
        found_by: Vec<Engine>,
        scan: &ScanParams,
        as_of: DateTime<Utc>,
    ) -> Opportunity {
        let amount = scan.trade_amount;
        let gross_profit = amount * (cycle.net_multiplier() - 1.0);
        let gas_cost = cycle.total_gas() as f64 * self.settings.gas_unit_price;
        let net_profit = gross_profit - gas_cost;

        let risk = scan.min_confidence.map(|min_confidence| {
            let input = RiskInput::for_cycle(&cycle, amount, gross_profit, gas_cost, as_of);
            self.risk.evaluate(&input, min_confidence)
        });
        let accepted = risk.map_or(true, |r| r.accepted);

        Opportunity {
            cycle,
            found_by,
            trade_amount: amount,
            gross_profit,
            gas_cost,
            net_profit,
            risk,
            accepted,
        }
    }
}

/// Net profit desc, then fewer hops, then higher confidence
fn rank(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.net_profit
        .partial_cmp(&a.net_profit)
        .unwrap_or(Ordering::Equal)
        .then(a.cycle.hop_count().cmp(&b.cycle.hop_count()))
        .then(
            b.confidence()
                .unwrap_or(0.0)
                .partial_cmp(&a.confidence().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
        )
        .then_with(|| a.cycle.key().cmp(&b.cycle.key()))
}

fn spawn_engine<F>(snapshot: &Arc<GraphSnapshot>, enabled: bool, run: F) -> JoinHandle<Vec<ArbitrageCycle>>
where
    F: FnOnce(&GraphSnapshot) -> Vec<ArbitrageCycle> + Send + 'static,
{
    let snapshot = Arc::clone(snapshot);
    tokio::task::spawn_blocking(move || if enabled { run(&snapshot) } else { Vec::new() })
}

/// Print the ranked list the way the operator sees it
pub fn print_opportunities(report: &DetectionReport, tokens: &TokenBook, limit: usize) {
    if report.opportunities.is_empty() {
        println!("{}", style("No opportunities above threshold.").yellow());
        return;
    }

    println!();
    println!("{}", style("═══ RANKED OPPORTUNITIES ═══").yellow().bold());
    println!();

    for (i, opp) in report.opportunities.iter().take(limit).enumerate() {
        let status = if opp.accepted {
            style("✓ ACCEPTED").green()
        } else {
            style("✗ rejected").red()
        };
        println!(
            "  {}. {} | {:.4}x ({:+.3}%) | {} hops",
            i + 1,
            status,
            opp.cycle.net_multiplier(),
            opp.cycle.profit_percentage(),
            opp.cycle.hop_count()
        );
        println!("     Path: {}", style(opp.format_path(tokens)).cyan());
        println!(
            "     Gross: {:+.6} | Gas: {:.6} | Net: {:+.6}",
            opp.gross_profit, opp.gas_cost, opp.net_profit
        );
        match &opp.risk {
            Some(risk) => println!(
                "     Confidence: {:.2} ({} risk) | Found by: {}",
                risk.confidence,
                risk.level,
                opp.engines_label()
            ),
            None => println!("     Risk evaluation off | Found by: {}", opp.engines_label()),
        }
        println!();
    }

    if report.opportunities.len() > limit {
        println!("  ... and {} more", report.opportunities.len() - limit);
    }
}
