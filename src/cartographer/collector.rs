//! Concurrent quote acquisition
//!
//! Requests run concurrently but are bounded twice: a semaphore caps the
//! number in flight and a shared interval spaces request starts. A pair that
//! keeps failing is dropped from this pass; the rest of the batch survives.

use alloy_primitives::Address;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::quote::{PairQuote, Quote, QuoteProvider};
use crate::errors::QuoteError;

/// Limits applied while fetching a batch of quotes
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Requests allowed in flight at once
    pub max_concurrent: usize,

    /// Request starts per second across the whole batch
    pub requests_per_sec: f64,

    /// Extra attempts for retryable failures
    pub max_retries: u32,

    /// First backoff delay, doubled on each retry
    pub backoff_base: Duration,

    /// Draw a progress bar on the terminal
    pub show_progress: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            requests_per_sec: 10.0,
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
            show_progress: false,
        }
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, Default)]
pub struct CollectReport {
    /// Successful quotes, ordered by pair
    pub quotes: Vec<PairQuote>,

    /// Pairs the provider does not quote
    pub invalid_pairs: usize,

    /// Pairs dropped after exhausting retries
    pub failed: usize,
}

pub struct QuoteCollector {
    settings: CollectorSettings,
}

impl QuoteCollector {
    pub fn new(settings: CollectorSettings) -> Self {
        Self { settings }
    }

    /// Fetch every pair, dropping the ones that cannot be quoted
    pub async fn collect(
        &self,
        provider: Arc<dyn QuoteProvider>,
        pairs: &[(Address, Address)],
        amount: f64,
    ) -> CollectReport {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let pacer = Arc::new(Mutex::new(self.pacer()));
        let progress = self.progress_bar(pairs.len() as u64, provider.name());

        let tasks = pairs.iter().map(|&(from, to)| {
            let provider = Arc::clone(&provider);
            let semaphore = Arc::clone(&semaphore);
            let pacer = Arc::clone(&pacer);
            let progress = progress.clone();
            let settings = &self.settings;

            async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => fetch_with_retry(provider.as_ref(), &pacer, settings, from, to, amount).await,
                    Err(_) => Err(QuoteError::Network("request limiter closed".to_string())),
                };
                progress.inc(1);
                (from, to, result)
            }
        });

        let results = join_all(tasks).await;
        progress.finish_and_clear();

        let mut report = CollectReport::default();
        for (from, to, result) in results {
            match result {
                Ok(quote) => report.quotes.push(PairQuote::new(from, to, quote)),
                Err(QuoteError::InvalidPair { .. }) => report.invalid_pairs += 1,
                Err(e) => {
                    warn!("Dropping {:?} -> {:?} for this pass: {}", from, to, e);
                    report.failed += 1;
                }
            }
        }
        report.quotes.sort_by(|a, b| (a.from, a.to).cmp(&(b.from, b.to)));

        info!(
            "Collected {} quotes from {} ({} unquoted pairs, {} failed)",
            report.quotes.len(),
            provider.name(),
            report.invalid_pairs,
            report.failed
        );

        report
    }

    fn pacer(&self) -> Interval {
        let per_sec = if self.settings.requests_per_sec.is_finite() && self.settings.requests_per_sec > 0.0 {
            self.settings.requests_per_sec
        } else {
            1.0
        };
        // tokio rejects a zero period
        let period = Duration::from_secs_f64(1.0 / per_sec).max(Duration::from_nanos(1));
        let mut pacer = interval(period);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        pacer
    }

    fn progress_bar(&self, len: u64, source: &str) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{bar:40}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(format!("Fetching {} quotes", source));
        bar
    }
}

async fn fetch_with_retry(
    provider: &dyn QuoteProvider,
    pacer: &Mutex<Interval>,
    settings: &CollectorSettings,
    from: Address,
    to: Address,
    amount: f64,
) -> Result<Quote, QuoteError> {
    let mut attempt = 0u32;
    loop {
        pacer.lock().await.tick().await;

        match provider.get_quote(from, to, amount).await {
            Ok(quote) => return Ok(quote),
            Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                let delay = settings.backoff_base * 2u32.saturating_pow(attempt);
                debug!(
                    "Quote {:?} -> {:?} attempt {} failed ({}), retrying in {:?}",
                    from,
                    to,
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
