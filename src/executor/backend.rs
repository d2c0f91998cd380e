//! Execution backend contract plus the retry and confirmation loops around it

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::signer::SignedBatch;
use crate::errors::BackendError;

/// Identifier returned for a submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Failed,
    Timeout,
}

/// Where signed swaps go
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a whole batch lands or fails together
    fn supports_atomic(&self) -> bool;

    async fn submit(&self, batch: &SignedBatch) -> Result<TxSignature, BackendError>;

    async fn confirm(&self, signature: &TxSignature) -> Result<ConfirmationStatus, BackendError>;
}

/// Bounds for submission retries and confirmation polling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_submit_retries: u32,
    pub confirm_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_submit_retries: 3,
            confirm_attempts: 10,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given attempt, capped at `backoff_max`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Submit, retrying only transient failures
pub async fn submit_with_retry(
    backend: &dyn ExecutionBackend,
    batch: &SignedBatch,
    policy: &RetryPolicy,
) -> Result<TxSignature, BackendError> {
    let mut attempt = 0;
    loop {
        match backend.submit(batch).await {
            Ok(signature) => return Ok(signature),
            Err(e) if e.is_retryable() && attempt < policy.max_submit_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Submission to {} failed ({}), retry {}/{} in {:?}",
                    backend.name(),
                    e,
                    attempt + 1,
                    policy.max_submit_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll until the submission resolves or the attempts run out
///
/// Returns `Timeout` when it is still pending after the last attempt.
/// Transient polling errors count as an attempt; anything else is returned.
pub async fn await_confirmation(
    backend: &dyn ExecutionBackend,
    signature: &TxSignature,
    policy: &RetryPolicy,
) -> Result<ConfirmationStatus, BackendError> {
    for attempt in 0..policy.confirm_attempts {
        match backend.confirm(signature).await {
            Ok(ConfirmationStatus::Pending) => {
                debug!("{} still pending (poll {})", signature, attempt + 1);
            }
            Ok(status) => return Ok(status),
            Err(e) if e.is_retryable() => {
                warn!("Confirmation poll for {} failed: {}", signature, e);
            }
            Err(e) => return Err(e),
        }
        if attempt + 1 < policy.confirm_attempts {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }
    Ok(ConfirmationStatus::Timeout)
}
