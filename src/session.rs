//! Process-scoped state and the analysis passes built on it
//!
//! A `Session` owns the cached quote graph and the token book. Detection
//! always runs on an immutable snapshot taken under a short read lock, so a
//! refresh never races a search.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use console::style;
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, RwLockReadGuard};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::brain::{DetectionReport, OpportunityIntegrator, RiskEvaluator, ScanParams};
use crate::cartographer::{
    ArbitrageGraph, BuildStats, GraphSnapshot, HistoricalProvider, PairQuote, QuoteCollector, QuoteProvider,
};
use crate::config::{Config, OpportunityLog};
use crate::executor::{Credential, ExecutionEngine, ExecutionResult};
use crate::tokens::TokenBook;

pub struct Session {
    config: Config,
    graph: RwLock<ArbitrageGraph>,
    tokens: RwLock<TokenBook>,
}

/// Lets the live loop execute the best accepted opportunity of each pass
pub struct AutoExecute<'a> {
    pub engine: &'a ExecutionEngine,
    pub credential: &'a Credential,
    pub identity: Option<Address>,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub interval: Duration,
    /// Stop after this many passes; `None` runs until cancelled
    pub max_passes: Option<usize>,
}

#[derive(Debug, Default)]
pub struct LoopSummary {
    pub passes: usize,
    pub failed_passes: usize,
    pub opportunities_seen: usize,
    pub executions: Vec<ExecutionResult>,
    /// Set when cancellation landed after detection and before execution
    pub cancelled_before_execution: bool,
}

impl Session {
    pub fn new(config: Config, tokens: TokenBook) -> Self {
        Self {
            config,
            graph: RwLock::new(ArbitrageGraph::new()),
            tokens: RwLock::new(tokens),
        }
    }

    /// Start from the configured token cache, or an empty book if it is missing
    pub fn load(config: Config) -> Self {
        let tokens = match TokenBook::load(&config.token_cache_path) {
            Ok(book) => book,
            Err(e) => {
                warn!("Starting with an empty token book: {:#}", e);
                TokenBook::default()
            }
        };
        Self::new(config, tokens)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn tokens(&self) -> RwLockReadGuard<'_, TokenBook> {
        self.tokens.read().await
    }

    /// Reload the token universe from the cache file
    pub async fn refresh_tokens(&self) -> Result<usize> {
        let mut tokens = self.tokens.write().await;
        tokens.refresh(&self.config.token_cache_path)
    }

    /// Merge quotes into the cached graph
    pub async fn ingest(&self, quotes: &[PairQuote], as_of: DateTime<Utc>) -> BuildStats {
        let mut graph = self.graph.write().await;
        graph.merge(quotes, as_of, self.config.quote_ttl())
    }

    /// Drop the cache and rebuild it from these quotes only
    pub async fn replace_graph(&self, quotes: &[PairQuote], as_of: DateTime<Utc>) -> BuildStats {
        let mut graph = self.graph.write().await;
        *graph = ArbitrageGraph::new();
        graph.merge(quotes, as_of, self.config.quote_ttl())
    }

    pub async fn snapshot(&self, as_of: DateTime<Utc>) -> Arc<GraphSnapshot> {
        let graph = self.graph.read().await;
        Arc::new(graph.snapshot(as_of, self.config.quote_ttl()))
    }

    async fn integrator(&self) -> OpportunityIntegrator {
        let tokens = self.tokens.read().await;
        OpportunityIntegrator::new(
            self.config.detection_settings(&tokens),
            RiskEvaluator::new(self.config.risk_params()),
        )
    }

    /// Run the engines on the fresh part of the cache
    pub async fn detect(&self, as_of: DateTime<Utc>, scan: &ScanParams) -> Result<DetectionReport> {
        let snapshot = self.snapshot(as_of).await;
        debug!(
            "Snapshot at {}: {} tokens, {} fresh edges",
            as_of,
            snapshot.node_count(),
            snapshot.edge_count()
        );
        let integrator = self.integrator().await;
        let report = integrator.detect(snapshot, scan).await?;
        Ok(report)
    }

    /// Replay the historical dataset and detect on it
    pub async fn run_historical(&self, scan: &ScanParams) -> Result<DetectionReport> {
        let path = &self.config.historical_dataset_path;
        let provider = HistoricalProvider::load(path)
            .wrap_err_with(|| format!("loading historical dataset {}", path))?;
        let as_of = provider.as_of();
        let pairs = provider.pairs();

        let collector = QuoteCollector::new(self.config.collector_settings(false));
        let collected = collector.collect(Arc::new(provider), &pairs, scan.trade_amount).await;

        let stats = self.replace_graph(&collected.quotes, as_of).await;
        info!(
            "Historical graph built: {} edges inserted, {} rejected",
            stats.inserted, stats.rejected
        );

        let report = self.detect(as_of, scan).await?;
        self.log_opportunities(&report, "historical").await;
        Ok(report)
    }

    /// Quote every ordered token pair once, merge, and detect
    pub async fn run_live_pass(
        &self,
        provider: Arc<dyn QuoteProvider>,
        scan: &ScanParams,
        show_progress: bool,
    ) -> Result<DetectionReport> {
        let pairs = self.tokens.read().await.ordered_pairs();
        if pairs.is_empty() {
            return Err(eyre::eyre!("Token book is empty; refresh the token list first"));
        }

        let collector = QuoteCollector::new(self.config.collector_settings(show_progress));
        let collected = collector.collect(provider, &pairs, scan.trade_amount).await;

        let as_of = Utc::now();
        let stats = self.ingest(&collected.quotes, as_of).await;
        debug!("Live merge: {:?}", stats);

        let report = self.detect(as_of, scan).await?;
        self.log_opportunities(&report, "live").await;
        Ok(report)
    }

    /// Repeat live passes until cancelled
    ///
    /// Cancellation is checked before each pass and again between detection
    /// and execution. A submitted execution is always awaited.
    pub async fn run_live_loop(
        &self,
        provider: Arc<dyn QuoteProvider>,
        scan: &ScanParams,
        settings: LoopSettings,
        auto: Option<AutoExecute<'_>>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<LoopSummary> {
        let mut summary = LoopSummary::default();
        let mut ticker = interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *cancel.borrow() {
                info!("Live loop cancelled");
                break;
            }
            if settings.max_passes.is_some_and(|max| summary.passes >= max) {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Live loop cancelled");
                        break;
                    }
                }
            }

            summary.passes += 1;
            let report = match self.run_live_pass(Arc::clone(&provider), scan, false).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("Live pass {} failed: {:#}", summary.passes, e);
                    summary.failed_passes += 1;
                    continue;
                }
            };
            summary.opportunities_seen += report.opportunities.len();

            let Some(auto) = auto.as_ref() else {
                continue;
            };
            let Some(best) = report.accepted().next() else {
                continue;
            };

            if *cancel.borrow() {
                info!("Cancelled after detection; not executing");
                summary.cancelled_before_execution = true;
                break;
            }

            match auto
                .engine
                .execute(best, scan.trade_amount, auto.credential, auto.identity)
                .await
            {
                Ok(result) => summary.executions.push(result),
                Err(e) => warn!("Skipped execution: {}", e),
            }
        }

        info!(
            "Live loop finished: {} passes, {} opportunities, {} executions",
            summary.passes,
            summary.opportunities_seen,
            summary.executions.len()
        );
        Ok(summary)
    }

    async fn log_opportunities(&self, report: &DetectionReport, source: &str) {
        if !self.config.opportunity_log || report.opportunities.is_empty() {
            return;
        }
        let tokens = self.tokens.read().await;
        for opportunity in &report.opportunities {
            let entry = OpportunityLog::from_opportunity(opportunity, &tokens, source);
            if let Err(e) = entry.append_to_file(&self.config.opportunity_log_path) {
                warn!("Could not write opportunity log: {:#}", e);
                return;
            }
        }
        debug!(
            "📝 Logged {} opportunities to {}",
            report.opportunities.len(),
            self.config.opportunity_log_path
        );
    }
}

/// Cancellation fed by Ctrl-C
pub fn ctrl_c_cancellation() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current step");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Print a short description of the graph a pass ran on
pub fn print_graph_summary(snapshot: &GraphSnapshot, tokens: &TokenBook) {
    let edges: Vec<_> = snapshot.edges().map(|(_, _, e)| snapshot.edge(e)).collect();
    println!();
    println!("{}", style("═══ GRAPH ═══").blue().bold());
    println!("   Tokens: {}", snapshot.node_count());
    println!("   Fresh edges: {}", edges.len());
    if edges.is_empty() {
        return;
    }

    let mean_fee = edges.iter().map(|e| e.fee).sum::<f64>() / edges.len() as f64;
    println!("   Mean fee: {:.4}%", mean_fee * 100.0);

    if let Some(best) = edges
        .iter()
        .max_by(|a, b| a.log_gain().partial_cmp(&b.log_gain()).unwrap_or(std::cmp::Ordering::Equal))
    {
        println!(
            "   Best hop: {} → {} at {:.6} net",
            tokens.format_token(&best.from),
            tokens.format_token(&best.to),
            best.log_gain().exp()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::graph::tests::{quote, token};
    use crate::cartographer::Quote;
    use crate::errors::QuoteError;
    use crate::executor::paper::PaperBackend;
    use crate::executor::signer::tests::TEST_KEY;
    use crate::executor::{RetryPolicy, TransactionBuilder};
    use crate::tokens::Token;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fixed rates stamped with the time of the request
    struct FixedProvider {
        rates: HashMap<(Address, Address), f64>,
        /// Flipped to true on the first request
        cancel_on_quote: Mutex<Option<watch::Sender<bool>>>,
    }

    impl FixedProvider {
        fn triangle(rate: f64) -> Self {
            let rates = [quote(1, 2, rate), quote(2, 3, rate), quote(3, 1, rate)]
                .into_iter()
                .map(|q| ((q.from, q.to), q.quote.rate))
                .collect();
            Self {
                rates,
                cancel_on_quote: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn get_quote(&self, from: Address, to: Address, _amount: f64) -> Result<Quote, QuoteError> {
            if let Some(tx) = self.cancel_on_quote.lock().unwrap().take() {
                tx.send(true).unwrap();
            }
            let rate = self.rates.get(&(from, to)).copied().ok_or(QuoteError::InvalidPair { from, to })?;
            Ok(Quote {
                rate,
                fee: 0.0,
                gas: 5_000,
                liquidity: 1_000_000.0,
                observed_at: Utc::now(),
            })
        }
    }

    fn book() -> TokenBook {
        TokenBook::new(
            (1..=3)
                .map(|n| Token {
                    address: token(n),
                    symbol: format!("T{}", n),
                    decimals: 9,
                })
                .collect(),
        )
    }

    fn session() -> Session {
        let mut config = Config::default();
        config.opportunity_log = false;
        config.max_quote_requests_per_sec = 1_000.0;
        Session::new(config, book())
    }

    fn scan() -> ScanParams {
        ScanParams {
            threshold: 0.005,
            trade_amount: 10.0,
            min_confidence: Some(0.5),
        }
    }

    fn fast_loop(max_passes: usize) -> LoopSettings {
        LoopSettings {
            interval: Duration::from_millis(5),
            max_passes: Some(max_passes),
        }
    }

    #[tokio::test]
    async fn test_live_pass_finds_triangle() {
        let session = session();
        let report = session
            .run_live_pass(Arc::new(FixedProvider::triangle(1.02)), &scan(), false)
            .await
            .unwrap();

        assert_eq!(report.opportunities.len(), 1);
        assert!(report.opportunities[0].accepted);
        assert_eq!(report.opportunities[0].cycle.path(), vec![token(1), token(2), token(3), token(1)]);
    }

    #[tokio::test]
    async fn test_empty_token_book_is_an_error() {
        let session = Session::new(Config::default(), TokenBook::default());
        let result = session
            .run_live_pass(Arc::new(FixedProvider::triangle(1.02)), &scan(), false)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stale_cache_edges_are_ignored() {
        let session = session();
        let old = Utc::now() - chrono::Duration::seconds(600);
        let quotes: Vec<PairQuote> = [quote(1, 2, 1.02), quote(2, 3, 1.02), quote(3, 1, 1.02)]
            .into_iter()
            .map(|mut q| {
                q.quote.observed_at = old;
                q
            })
            .collect();
        session.ingest(&quotes, old).await;

        let report = session.detect(Utc::now(), &scan()).await.unwrap();
        assert!(report.opportunities.is_empty());
    }

    #[tokio::test]
    async fn test_loop_executes_on_paper() {
        let session = session();
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let paper = Arc::new(PaperBackend::new(true));
        paper.deposit(credential.address(), token(1), 10.0);
        let engine = ExecutionEngine::new(
            paper.clone(),
            TransactionBuilder::new(0.01, 1e-9, vec![]),
            RetryPolicy::default(),
        );
        let (_tx, rx) = watch::channel(false);

        let summary = session
            .run_live_loop(
                Arc::new(FixedProvider::triangle(1.02)),
                &scan(),
                fast_loop(1),
                Some(AutoExecute {
                    engine: &engine,
                    credential: &credential,
                    identity: Some(credential.address()),
                }),
                rx,
            )
            .await
            .unwrap();

        assert_eq!(summary.passes, 1);
        assert_eq!(summary.executions.len(), 1);
        assert!(summary.executions[0].is_success());
        assert!(paper.balance(credential.address(), token(1)) > 10.0);
    }

    #[tokio::test]
    async fn test_cancel_between_detection_and_execution() {
        let session = session();
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let paper = Arc::new(PaperBackend::new(true));
        paper.deposit(credential.address(), token(1), 10.0);
        let engine = ExecutionEngine::new(
            paper.clone(),
            TransactionBuilder::new(0.01, 1e-9, vec![]),
            RetryPolicy::default(),
        );

        let (tx, rx) = watch::channel(false);
        let provider = FixedProvider::triangle(1.02);
        *provider.cancel_on_quote.lock().unwrap() = Some(tx);

        let summary = session
            .run_live_loop(
                Arc::new(provider),
                &scan(),
                fast_loop(5),
                Some(AutoExecute {
                    engine: &engine,
                    credential: &credential,
                    identity: None,
                }),
                rx,
            )
            .await
            .unwrap();

        assert_eq!(summary.passes, 1);
        assert!(summary.cancelled_before_execution);
        assert!(summary.executions.is_empty());
        assert_eq!(paper.balance(credential.address(), token(1)), 10.0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_pass() {
        let session = session();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let summary = session
            .run_live_loop(Arc::new(FixedProvider::triangle(1.02)), &scan(), fast_loop(3), None, rx)
            .await
            .unwrap();
        assert_eq!(summary.passes, 0);
    }
}
