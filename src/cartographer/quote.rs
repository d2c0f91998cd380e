//! Quote model and the provider contract
//!
//! Both the historical dataset and the live API sit behind `QuoteProvider`,
//! so the rest of the pipeline never knows where a rate came from.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::QuoteError;

/// A single directed quote: how much `to` one unit of `from` buys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Output per input, before fees
    pub rate: f64,

    /// Fee fraction charged on the swap (0.003 = 0.3%)
    pub fee: f64,

    /// Gas estimate in native units
    pub gas: u64,

    /// Depth available on this pair, in input-token units
    pub liquidity: f64,

    pub observed_at: DateTime<Utc>,
}

/// A quote bound to its ordered pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairQuote {
    pub from: Address,
    pub to: Address,
    #[serde(flatten)]
    pub quote: Quote,
}

impl PairQuote {
    pub fn new(from: Address, to: Address, quote: Quote) -> Self {
        Self { from, to, quote }
    }
}

/// Source of pair quotes
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Quote swapping `amount` of `from` into `to`
    async fn get_quote(&self, from: Address, to: Address, amount: f64) -> Result<Quote, QuoteError>;
}
