//! Live quote feed over HTTP

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::quote::{Quote, QuoteProvider};
use crate::errors::QuoteError;

/// Body returned by the quote endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LiveQuoteResponse {
    pub rate: f64,
    #[serde(default)]
    pub fee: f64,
    #[serde(default)]
    pub gas: u64,
    pub liquidity: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LiveQuoteResponse {
    /// Quotes without a timestamp are stamped with the receive time
    pub fn into_quote(self, received_at: DateTime<Utc>) -> Quote {
        Quote {
            rate: self.rate,
            fee: self.fee,
            gas: self.gas,
            liquidity: self.liquidity,
            observed_at: self.timestamp.unwrap_or(received_at),
        }
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy
pub fn classify_status(status: StatusCode, from: Address, to: Address) -> QuoteError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => QuoteError::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            QuoteError::InvalidPair { from, to }
        }
        other => QuoteError::Network(format!("quote endpoint returned {}", other)),
    }
}

/// Quote provider backed by the live API
pub struct LiveQuoteProvider {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LiveQuoteProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("building quote HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl QuoteProvider for LiveQuoteProvider {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn get_quote(&self, from: Address, to: Address, amount: f64) -> Result<Quote, QuoteError> {
        let mut request = self.http_client.get(&self.base_url).query(&[
            ("inputMint", format!("{:?}", from)),
            ("outputMint", format!("{:?}", to)),
            ("amount", amount.to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!("Quote {:?} -> {:?} failed with {}", from, to, status);
            return Err(classify_status(status, from, to));
        }

        let body: LiveQuoteResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Network(format!("malformed quote body: {}", e)))?;

        Ok(body.into_quote(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_mapping() {
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, a, b), QuoteError::RateLimited);
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, a, b),
            QuoteError::InvalidPair { from: a, to: b }
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, a, b),
            QuoteError::Network(_)
        ));
    }

    #[test]
    fn test_response_without_timestamp_uses_receive_time() {
        let body: LiveQuoteResponse =
            serde_json::from_str(r#"{"rate":1.01,"liquidity":250.0}"#).unwrap();
        let received = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let quote = body.into_quote(received);
        assert_eq!(quote.observed_at, received);
        assert_eq!(quote.fee, 0.0);
        assert_eq!(quote.gas, 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let provider = LiveQuoteProvider::new("http://127.0.0.1:9/quote", None, Duration::from_secs(2)).unwrap();
        let err = provider
            .get_quote(Address::repeat_byte(1), Address::repeat_byte(2), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::Network(_)));
    }
}
