//! Paper backend for dry runs
//!
//! Keeps balances in memory and settles each batch at the quoted output,
//! optionally shaved by a fixed drift to exercise the min-out guards.

use alloy_primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use super::backend::{ConfirmationStatus, ExecutionBackend, TxSignature};
use super::signer::{verify_batch, SignedBatch};
use crate::errors::BackendError;

const BALANCE_TOLERANCE: f64 = 1e-9;

type Balances = HashMap<(Address, Address), f64>;

pub struct PaperBackend {
    balances: Mutex<Balances>,
    submissions: Mutex<HashMap<TxSignature, ConfirmationStatus>>,
    counter: AtomicU64,
    atomic: bool,
    /// Fraction shaved off every quoted output
    drift: f64,
}

impl PaperBackend {
    pub fn new(atomic: bool) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            submissions: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            atomic,
            drift: 0.0,
        }
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = drift.clamp(0.0, 1.0);
        self
    }

    pub fn deposit(&self, owner: Address, token: Address, amount: f64) {
        if let Ok(mut balances) = self.balances.lock() {
            *balances.entry((owner, token)).or_insert(0.0) += amount;
        }
    }

    pub fn balance(&self, owner: Address, token: Address) -> f64 {
        self.balances
            .lock()
            .map(|b| b.get(&(owner, token)).copied().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    fn settle(&self, balances: &mut Balances, batch: &SignedBatch) -> Result<(), BackendError> {
        for signed in &batch.instructions {
            let ix = &signed.instruction;
            let held = balances.get(&(batch.signer, ix.from)).copied().unwrap_or(0.0);
            if held + BALANCE_TOLERANCE * ix.amount_in.max(1.0) < ix.amount_in {
                return Err(BackendError::InsufficientFunds(format!(
                    "hop {} needs {:.6} of {:?}, holding {:.6}",
                    ix.hop, ix.amount_in, ix.from, held
                )));
            }

            let out = ix.expected_out * (1.0 - self.drift);
            if out < ix.min_out {
                return Err(BackendError::SlippageExceeded(format!(
                    "hop {} returned {:.6} below minimum {:.6}",
                    ix.hop, out, ix.min_out
                )));
            }

            balances.insert((batch.signer, ix.from), (held - ix.amount_in).max(0.0));
            *balances.entry((batch.signer, ix.to)).or_insert(0.0) += out;
            debug!("Paper hop {}: {:.6} -> {:.6}", ix.hop, ix.amount_in, out);
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for PaperBackend {
    fn name(&self) -> &'static str {
        "paper"
    }

    fn supports_atomic(&self) -> bool {
        self.atomic
    }

    async fn submit(&self, batch: &SignedBatch) -> Result<TxSignature, BackendError> {
        if batch.is_empty() {
            return Err(BackendError::InvalidInstruction("empty batch".to_string()));
        }
        verify_batch(batch).map_err(|e| BackendError::InvalidInstruction(e.to_string()))?;

        {
            let mut balances = self
                .balances
                .lock()
                .map_err(|_| BackendError::Network("paper ledger poisoned".to_string()))?;

            // Settle against a copy so a failing batch leaves no trace
            let mut scratch = balances.clone();
            self.settle(&mut scratch, batch)?;
            *balances = scratch;
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let signature = TxSignature(format!("paper-{:06}", n));
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.insert(signature.clone(), ConfirmationStatus::Confirmed);
        }
        info!("Paper batch settled: {} ({} hops)", signature, batch.len());
        Ok(signature)
    }

    async fn confirm(&self, signature: &TxSignature) -> Result<ConfirmationStatus, BackendError> {
        let submissions = self
            .submissions
            .lock()
            .map_err(|_| BackendError::Network("paper ledger poisoned".to_string()))?;
        submissions
            .get(signature)
            .copied()
            .ok_or_else(|| BackendError::InvalidInstruction(format!("unknown signature {}", signature)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::plan::SwapInstruction;
    use crate::executor::signer::tests::TEST_KEY;
    use crate::executor::signer::Credential;

    fn ix(hop: usize, from: u8, to: u8, amount_in: f64, rate: f64) -> SwapInstruction {
        SwapInstruction {
            hop,
            from: Address::repeat_byte(from),
            to: Address::repeat_byte(to),
            amount_in,
            expected_out: amount_in * rate,
            min_out: amount_in * rate * 0.99,
            fee_estimate: 0.0,
            gas: 5_000,
        }
    }

    async fn batch(credential: &Credential, ixs: &[SwapInstruction]) -> SignedBatch {
        let signed = credential.sign_all(ixs).await.unwrap();
        credential.sign_batch(signed).await.unwrap()
    }

    #[tokio::test]
    async fn test_settles_cycle() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let owner = credential.address();
        let backend = PaperBackend::new(true);
        backend.deposit(owner, Address::repeat_byte(1), 10.0);

        let b = batch(&credential, &[ix(0, 1, 2, 10.0, 1.02), ix(1, 2, 1, 10.2, 1.02)]).await;
        let sig = backend.submit(&b).await.unwrap();

        assert_eq!(backend.confirm(&sig).await.unwrap(), ConfirmationStatus::Confirmed);
        assert!((backend.balance(owner, Address::repeat_byte(1)) - 10.404).abs() < 1e-9);
        assert!(backend.balance(owner, Address::repeat_byte(2)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_balances() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let owner = credential.address();
        let backend = PaperBackend::new(true);
        backend.deposit(owner, Address::repeat_byte(1), 10.0);

        // Second hop spends more than the first produces
        let b = batch(&credential, &[ix(0, 1, 2, 10.0, 1.0), ix(1, 2, 1, 50.0, 1.0)]).await;
        let err = backend.submit(&b).await.unwrap_err();

        assert!(matches!(err, BackendError::InsufficientFunds(_)));
        assert_eq!(backend.balance(owner, Address::repeat_byte(1)), 10.0);
    }

    #[tokio::test]
    async fn test_drift_trips_min_out() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let backend = PaperBackend::new(false).with_drift(0.05);
        backend.deposit(credential.address(), Address::repeat_byte(1), 10.0);

        let b = batch(&credential, &[ix(0, 1, 2, 10.0, 1.02)]).await;
        assert!(matches!(backend.submit(&b).await, Err(BackendError::SlippageExceeded(_))));
    }

    #[tokio::test]
    async fn test_tampered_batch_refused() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let backend = PaperBackend::new(true);
        backend.deposit(credential.address(), Address::repeat_byte(1), 10.0);

        let mut b = batch(&credential, &[ix(0, 1, 2, 10.0, 1.02)]).await;
        b.instructions[0].instruction.amount_in = 1.0;
        assert!(matches!(backend.submit(&b).await, Err(BackendError::InvalidInstruction(_))));
    }
}
