//! Historical quote dataset
//!
//! Replays a recorded set of quotes. The dataset's "now" is its newest
//! timestamp, so staleness is judged the way it would have been live.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::quote::{PairQuote, Quote, QuoteProvider};
use crate::errors::QuoteError;

/// One row of the dataset file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub from: Address,
    pub to: Address,
    pub rate: f64,
    #[serde(default)]
    pub fee: f64,
    pub liquidity: f64,
    #[serde(default)]
    pub gas: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<QuoteRecord> for PairQuote {
    fn from(r: QuoteRecord) -> Self {
        PairQuote::new(
            r.from,
            r.to,
            Quote {
                rate: r.rate,
                fee: r.fee,
                gas: r.gas,
                liquidity: r.liquidity,
                observed_at: r.timestamp,
            },
        )
    }
}

/// Quote provider backed by a recorded dataset
#[derive(Debug, Clone)]
pub struct HistoricalProvider {
    quotes: BTreeMap<(Address, Address), Quote>,
    as_of: DateTime<Utc>,
}

impl HistoricalProvider {
    pub fn from_records(records: Vec<QuoteRecord>) -> Result<Self> {
        let as_of = records
            .iter()
            .map(|r| r.timestamp)
            .max()
            .ok_or_else(|| eyre!("historical dataset is empty"))?;

        let mut quotes: BTreeMap<(Address, Address), Quote> = BTreeMap::new();
        for record in records {
            let pair = PairQuote::from(record);
            let keep = match quotes.get(&(pair.from, pair.to)) {
                Some(existing) => pair.quote.observed_at >= existing.observed_at,
                None => true,
            };
            if keep {
                quotes.insert((pair.from, pair.to), pair.quote);
            }
        }

        Ok(Self { quotes, as_of })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading historical dataset {}", path.display()))?;
        let records: Vec<QuoteRecord> = serde_json::from_str(&content)
            .wrap_err_with(|| format!("parsing historical dataset {}", path.display()))?;

        let provider = Self::from_records(records)?;
        info!(
            "Loaded {} historical quotes (as of {})",
            provider.quotes.len(),
            provider.as_of
        );
        Ok(provider)
    }

    /// Newest timestamp in the dataset
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Pairs that have a recorded quote, in address order
    pub fn pairs(&self) -> Vec<(Address, Address)> {
        self.quotes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[async_trait]
impl QuoteProvider for HistoricalProvider {
    fn name(&self) -> &'static str {
        "historical"
    }

    async fn get_quote(&self, from: Address, to: Address, _amount: f64) -> Result<Quote, QuoteError> {
        match self.quotes.get(&(from, to)) {
            Some(quote) => Ok(quote.clone()),
            None => {
                debug!("No historical quote for {:?} -> {:?}", from, to);
                Err(QuoteError::InvalidPair { from, to })
            }
        }
    }
}
