//! Error types shared across the pipeline
//!
//! Domain failures are typed so callers can tell a dropped quote from a
//! partial execution. Application plumbing (config, IO, CLI) uses `eyre`.

use alloy_primitives::Address;
use thiserror::Error;

/// Failures reported by a quote provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("quote provider rate limited the request")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("no quote for pair {from} -> {to}")]
    InvalidPair { from: Address, to: Address },
}

impl QuoteError {
    /// Rate limits and transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuoteError::RateLimited | QuoteError::Network(_))
    }
}

/// Reasons a quoted edge is dropped while building the graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("non-positive rate {rate} for {from} -> {to}")]
    NonPositiveRate { from: Address, to: Address, rate: f64 },

    #[error("non-finite rate for {from} -> {to}")]
    NonFiniteRate { from: Address, to: Address },

    #[error("fee {fee} outside [0, 1) for {from} -> {to}")]
    FeeOutOfRange { from: Address, to: Address, fee: f64 },

    #[error("no usable liquidity for {from} -> {to}")]
    NoLiquidity { from: Address, to: Address },

    #[error("self-loop on {token}")]
    SelfLoop { token: Address },

    #[error("stale quote for {from} -> {to} ({age_secs}s old)")]
    Stale { from: Address, to: Address, age_secs: i64 },
}

/// Failures reported by an execution backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),

    #[error("backend rate limited the submission")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
}

impl BackendError {
    /// Only transient failures are retried; funds and slippage are final
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::RateLimited | BackendError::Network(_))
    }
}

/// Failures of an execution attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("opportunity was rejected by risk evaluation")]
    RiskRejected,

    #[error("no profit after fees (simulated net {net:.6})")]
    NoProfitAfterFees { net: f64 },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("credential {actual} does not match identity {expected}")]
    IdentityMismatch { expected: Address, actual: Address },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),

    #[error("confirmation timed out for {0}")]
    ConfirmationTimeout(String),

    #[error("transaction {0} failed on confirmation")]
    Reverted(String),

    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for ExecutionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InsufficientFunds(msg) => ExecutionError::InsufficientBalance(msg),
            BackendError::SlippageExceeded(msg) => ExecutionError::SlippageExceeded(msg),
            other => ExecutionError::Backend(other),
        }
    }
}

/// Failures of a detection pass
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("{engine} engine task failed: {reason}")]
    EngineFailed { engine: String, reason: String },

    #[error("invalid scan parameters: {0}")]
    InvalidParams(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(QuoteError::RateLimited.is_retryable());
        assert!(QuoteError::Network("reset".into()).is_retryable());
        assert!(!QuoteError::InvalidPair { from: Address::ZERO, to: Address::ZERO }.is_retryable());

        assert!(BackendError::RateLimited.is_retryable());
        assert!(!BackendError::InsufficientFunds("0x1".into()).is_retryable());
        assert!(!BackendError::SlippageExceeded("0x1771".into()).is_retryable());
    }

    #[test]
    fn test_backend_error_mapping() {
        let err: ExecutionError = BackendError::InsufficientFunds("hop 2".into()).into();
        assert_eq!(err, ExecutionError::InsufficientBalance("hop 2".into()));

        let err: ExecutionError = BackendError::RateLimited.into();
        assert_eq!(err, ExecutionError::Backend(BackendError::RateLimited));
    }
}
