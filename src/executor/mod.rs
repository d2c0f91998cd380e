//! Phase 4: The Executor
//!
//! This module handles the execution of accepted opportunities:
//! - Building a guarded swap plan and checking fees before signing
//! - Signing the sequence with the operator's credential
//! - Submitting atomically or hop by hop, and tracking what committed
//!
//! ⚠️  WARNING: In production mode this module moves real funds!
//! Use the paper backend (dry run) first.

pub mod backend;
pub mod paper;
pub mod plan;
pub mod relay;
pub mod signer;

pub use backend::{
    await_confirmation, submit_with_retry, ConfirmationStatus, ExecutionBackend, RetryPolicy,
    TxSignature,
};
pub use paper::PaperBackend;
pub use plan::{SwapInstruction, TransactionBuilder, TransactionPlan};
pub use relay::{RelayBackend, RelayMethods};
pub use signer::{generate_credential, recover_signer, verify_batch, Credential, SignedBatch, SignedInstruction};

use alloy_primitives::Address;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::brain::Opportunity;
use crate::errors::ExecutionError;

// ============================================
// RESULTS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Every hop confirmed
    Success,
    /// At least one hop committed, then a later one did not
    PartialExecution,
    /// Nothing confirmed, but a submitted hop may still land
    Unresolved,
    /// Nothing committed
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "SUCCESS"),
            ExecutionStatus::PartialExecution => write!(f, "PARTIAL EXECUTION"),
            ExecutionStatus::Unresolved => write!(f, "UNRESOLVED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HopOutcome {
    Committed { signature: TxSignature, amount_out: f64 },
    Failed { error: ExecutionError },
    /// Submitted but never confirmed either way
    Unresolved { signature: TxSignature },
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopReport {
    pub hop: usize,
    pub from: Address,
    pub to: Address,
    pub amount_in: f64,
    pub outcome: HopOutcome,
}

/// What an execution attempt did once submission started
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub plan: TransactionPlan,
    pub hops: Vec<HopReport>,
    /// Token the credential holds after the attempt
    pub held_token: Address,
    /// Estimated from quoted outputs of the committed hops
    pub held_amount: f64,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Signatures of the committed hops, in order
    pub fn signatures(&self) -> Vec<&TxSignature> {
        self.hops
            .iter()
            .filter_map(|h| match &h.outcome {
                HopOutcome::Committed { signature, .. } => Some(signature),
                _ => None,
            })
            .collect()
    }

    pub fn committed_hops(&self) -> usize {
        self.hops
            .iter()
            .filter(|h| matches!(h.outcome, HopOutcome::Committed { .. }))
            .count()
    }

    fn from_hops(plan: TransactionPlan, hops: Vec<HopReport>, error: Option<ExecutionError>) -> Self {
        let committed: Vec<&HopReport> = hops
            .iter()
            .filter(|h| matches!(h.outcome, HopOutcome::Committed { .. }))
            .collect();

        let status = if committed.len() == hops.len() && error.is_none() {
            ExecutionStatus::Success
        } else if !committed.is_empty() {
            ExecutionStatus::PartialExecution
        } else if hops.iter().any(|h| matches!(h.outcome, HopOutcome::Unresolved { .. })) {
            ExecutionStatus::Unresolved
        } else {
            ExecutionStatus::Failed
        };

        let (held_token, held_amount) = match committed.last() {
            Some(HopReport {
                to,
                outcome: HopOutcome::Committed { amount_out, .. },
                ..
            }) => (*to, *amount_out),
            _ => (plan.base_token, plan.amount_in),
        };

        Self {
            status,
            plan,
            hops,
            held_token,
            held_amount,
            error,
        }
    }
}

fn hop_reports(plan: &TransactionPlan, outcome: impl Fn(&SwapInstruction) -> HopOutcome) -> Vec<HopReport> {
    plan.instructions
        .iter()
        .map(|ix| HopReport {
            hop: ix.hop,
            from: ix.from,
            to: ix.to,
            amount_in: ix.amount_in,
            outcome: outcome(ix),
        })
        .collect()
}

// ============================================
// EXECUTION ENGINE
// ============================================

/// The main execution engine
pub struct ExecutionEngine {
    backend: Arc<dyn ExecutionBackend>,
    builder: TransactionBuilder,
    policy: RetryPolicy,
    /// One in-flight execution per credential address
    gates: DashMap<Address, Arc<Mutex<()>>>,
}

impl ExecutionEngine {
    pub fn new(backend: Arc<dyn ExecutionBackend>, builder: TransactionBuilder, policy: RetryPolicy) -> Self {
        Self {
            backend,
            builder,
            policy,
            gates: DashMap::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Build the plan without signing or submitting anything
    pub fn preview(&self, opportunity: &Opportunity, amount: f64) -> Result<TransactionPlan, ExecutionError> {
        self.builder.build(opportunity, amount)
    }

    /// Execute an opportunity
    ///
    /// Errors before submission (risk, fees, identity, signing) are returned
    /// as `Err`. Once anything is submitted the outcome is an
    /// `ExecutionResult`, so committed hops are never lost.
    pub async fn execute(
        &self,
        opportunity: &Opportunity,
        amount: f64,
        credential: &Credential,
        identity: Option<Address>,
    ) -> Result<ExecutionResult, ExecutionError> {
        if let Some(expected) = identity {
            credential.verify_identity(expected)?;
        }

        let plan = self.builder.build(opportunity, amount)?;

        let gate = self
            .gates
            .entry(credential.address())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        let signed = credential.sign_all(&plan.instructions).await?;

        info!(
            "Executing {}-hop plan via {} ({}), expected net {:+.6}",
            plan.hop_count(),
            self.backend.name(),
            if self.backend.supports_atomic() { "atomic" } else { "sequential" },
            plan.expected_net
        );

        let result = if self.backend.supports_atomic() {
            self.execute_atomic(plan, signed, credential).await?
        } else {
            self.execute_sequential(plan, signed, credential).await?
        };

        match result.status {
            ExecutionStatus::Success => info!("✅ Execution succeeded: {:?}", result.signatures()),
            ExecutionStatus::PartialExecution => error!(
                "🚨 PARTIAL EXECUTION: {}/{} hops committed, holding {:.6} of {:?}",
                result.committed_hops(),
                result.hops.len(),
                result.held_amount,
                result.held_token
            ),
            ExecutionStatus::Unresolved => error!(
                "⏳ UNRESOLVED: submitted hops never confirmed, position may have moved past {:?}",
                result.held_token
            ),
            ExecutionStatus::Failed => warn!("❌ Execution failed: {:?}", result.error),
        }

        Ok(result)
    }

    async fn execute_atomic(
        &self,
        plan: TransactionPlan,
        signed: Vec<SignedInstruction>,
        credential: &Credential,
    ) -> Result<ExecutionResult, ExecutionError> {
        let batch = credential.sign_batch(signed).await?;

        let signature = match submit_with_retry(self.backend.as_ref(), &batch, &self.policy).await {
            Ok(signature) => signature,
            Err(e) => {
                let error: ExecutionError = e.into();
                let hops = hop_reports(&plan, |_| HopOutcome::Failed { error: error.clone() });
                return Ok(ExecutionResult::from_hops(plan, hops, Some(error)));
            }
        };

        let (hops, error) = match await_confirmation(self.backend.as_ref(), &signature, &self.policy).await {
            Ok(ConfirmationStatus::Confirmed) => (
                hop_reports(&plan, |ix| HopOutcome::Committed {
                    signature: signature.clone(),
                    amount_out: ix.expected_out,
                }),
                None,
            ),
            Ok(ConfirmationStatus::Failed) => {
                let error = ExecutionError::Reverted(signature.to_string());
                (hop_reports(&plan, |_| HopOutcome::Failed { error: error.clone() }), Some(error))
            }
            Ok(ConfirmationStatus::Pending) | Ok(ConfirmationStatus::Timeout) => (
                hop_reports(&plan, |_| HopOutcome::Unresolved {
                    signature: signature.clone(),
                }),
                Some(ExecutionError::ConfirmationTimeout(signature.to_string())),
            ),
            Err(e) => (
                hop_reports(&plan, |_| HopOutcome::Unresolved {
                    signature: signature.clone(),
                }),
                Some(e.into()),
            ),
        };

        Ok(ExecutionResult::from_hops(plan, hops, error))
    }

    async fn execute_sequential(
        &self,
        plan: TransactionPlan,
        signed: Vec<SignedInstruction>,
        credential: &Credential,
    ) -> Result<ExecutionResult, ExecutionError> {
        // Seal every hop before the first submission
        let mut batches = Vec::with_capacity(signed.len());
        for instruction in signed {
            batches.push(credential.sign_batch(vec![instruction]).await?);
        }

        let mut hops = Vec::with_capacity(batches.len());
        let mut error = None;

        for batch in batches {
            let Some(ix) = batch.instructions.first().map(|s| s.instruction.clone()) else {
                continue;
            };
            let report = |outcome| HopReport {
                hop: ix.hop,
                from: ix.from,
                to: ix.to,
                amount_in: ix.amount_in,
                outcome,
            };

            if error.is_some() {
                hops.push(report(HopOutcome::Skipped));
                continue;
            }

            let signature = match submit_with_retry(self.backend.as_ref(), &batch, &self.policy).await {
                Ok(signature) => signature,
                Err(e) => {
                    let e: ExecutionError = e.into();
                    warn!("Hop {} rejected: {}", ix.hop, e);
                    hops.push(report(HopOutcome::Failed { error: e.clone() }));
                    error = Some(e);
                    continue;
                }
            };

            match await_confirmation(self.backend.as_ref(), &signature, &self.policy).await {
                Ok(ConfirmationStatus::Confirmed) => {
                    info!("Hop {} committed: {}", ix.hop, signature);
                    hops.push(report(HopOutcome::Committed {
                        signature,
                        amount_out: ix.expected_out,
                    }));
                }
                Ok(ConfirmationStatus::Failed) => {
                    let e = ExecutionError::Reverted(signature.to_string());
                    hops.push(report(HopOutcome::Failed { error: e.clone() }));
                    error = Some(e);
                }
                Ok(ConfirmationStatus::Pending) | Ok(ConfirmationStatus::Timeout) => {
                    error = Some(ExecutionError::ConfirmationTimeout(signature.to_string()));
                    hops.push(report(HopOutcome::Unresolved { signature }));
                }
                Err(e) => {
                    error = Some(e.into());
                    hops.push(report(HopOutcome::Unresolved { signature }));
                }
            }
        }

        Ok(ExecutionResult::from_hops(plan, hops, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::graph::tests::{quote, token};
    use crate::errors::BackendError;
    use crate::executor::plan::tests::opportunity;
    use crate::executor::signer::tests::TEST_KEY;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays scripted submit and confirm responses
    struct ScriptedBackend {
        atomic: bool,
        submits: std::sync::Mutex<VecDeque<Result<TxSignature, BackendError>>>,
        confirms: std::sync::Mutex<VecDeque<ConfirmationStatus>>,
        submitted: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(
            atomic: bool,
            submits: Vec<Result<TxSignature, BackendError>>,
            confirms: Vec<ConfirmationStatus>,
        ) -> Self {
            Self {
                atomic,
                submits: std::sync::Mutex::new(submits.into()),
                confirms: std::sync::Mutex::new(confirms.into()),
                submitted: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn supports_atomic(&self) -> bool {
            self.atomic
        }

        async fn submit(&self, _batch: &SignedBatch) -> Result<TxSignature, BackendError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Network("script exhausted".into())))
        }

        async fn confirm(&self, _signature: &TxSignature) -> Result<ConfirmationStatus, BackendError> {
            Ok(self
                .confirms
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ConfirmationStatus::Pending))
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_submit_retries: 2,
            confirm_attempts: 2,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
        }
    }

    fn engine(backend: Arc<dyn ExecutionBackend>) -> ExecutionEngine {
        ExecutionEngine::new(backend, TransactionBuilder::new(0.01, 1e-9, vec![]), fast())
    }

    fn sig(s: &str) -> TxSignature {
        TxSignature(s.to_string())
    }

    #[tokio::test]
    async fn test_partial_execution_keeps_committed_hop() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let backend = Arc::new(ScriptedBackend::new(
            false,
            vec![
                Ok(sig("sig-1")),
                Err(BackendError::InsufficientFunds("hop 2".into())),
            ],
            vec![ConfirmationStatus::Confirmed],
        ));
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let result = engine(backend).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::PartialExecution);
        assert_eq!(result.signatures(), vec![&sig("sig-1")]);
        assert_eq!(result.held_token, token(2));
        assert!((result.held_amount - 10.2).abs() < 1e-9);
        assert_eq!(result.error, Some(ExecutionError::InsufficientBalance("hop 2".into())));
        assert!(matches!(result.hops[1].outcome, HopOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_atomic_success() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 3, 1.02), quote(3, 1, 1.02)]);
        let backend = Arc::new(ScriptedBackend::new(
            true,
            vec![Ok(sig("bundle"))],
            vec![ConfirmationStatus::Pending, ConfirmationStatus::Confirmed],
        ));
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let result = engine(backend.clone()).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.committed_hops(), 3);
        assert_eq!(backend.submitted.load(Ordering::SeqCst), 1);
        assert_eq!(result.held_token, token(1));
        assert!((result.held_amount - 10.0 * 1.02f64.powi(3)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_atomic_timeout_is_unresolved() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let backend = Arc::new(ScriptedBackend::new(true, vec![Ok(sig("bundle"))], vec![]));
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let result = engine(backend).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Unresolved);
        assert!(matches!(result.hops[0].outcome, HopOutcome::Unresolved { .. }));
        assert_eq!(result.error, Some(ExecutionError::ConfirmationTimeout("bundle".into())));
    }

    #[tokio::test]
    async fn test_timeout_after_commit_is_partial() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let backend = Arc::new(ScriptedBackend::new(
            false,
            vec![Ok(sig("sig-1")), Ok(sig("sig-2"))],
            vec![ConfirmationStatus::Confirmed],
        ));
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let result = engine(backend).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::PartialExecution);
        assert_eq!(
            result.hops[1].outcome,
            HopOutcome::Unresolved { signature: sig("sig-2") }
        );
    }

    #[tokio::test]
    async fn test_first_hop_timeout_is_unresolved() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let backend = Arc::new(ScriptedBackend::new(false, vec![Ok(sig("sig-1"))], vec![]));
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let result = engine(backend.clone()).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Unresolved);
        assert_eq!(result.hops[0].outcome, HopOutcome::Unresolved { signature: sig("sig-1") });
        assert_eq!(result.hops[1].outcome, HopOutcome::Skipped);
        assert_eq!(result.error, Some(ExecutionError::ConfirmationTimeout("sig-1".into())));
        assert_eq!(backend.submitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_submit_errors_retried() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let backend = Arc::new(ScriptedBackend::new(
            true,
            vec![Err(BackendError::RateLimited), Ok(sig("bundle"))],
            vec![ConfirmationStatus::Confirmed],
        ));
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let result = engine(backend.clone()).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert!(result.is_success());
        assert_eq!(backend.submitted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejections_before_submission() {
        let backend = Arc::new(ScriptedBackend::new(true, vec![], vec![]));
        let engine = engine(backend.clone());
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let mut rejected = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        rejected.accepted = false;
        assert_eq!(
            engine.execute(&rejected, 10.0, &credential, None).await.unwrap_err(),
            ExecutionError::RiskRejected
        );

        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let err = engine
            .execute(&opp, 10.0, &credential, Some(Address::repeat_byte(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::IdentityMismatch { .. }));

        assert_eq!(backend.submitted.load(Ordering::SeqCst), 0);
    }

    /// Tracks how many submissions overlap
    struct SlowBackend {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn supports_atomic(&self) -> bool {
            true
        }

        async fn submit(&self, _batch: &SignedBatch) -> Result<TxSignature, BackendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(sig("slow"))
        }

        async fn confirm(&self, _signature: &TxSignature) -> Result<ConfirmationStatus, BackendError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ConfirmationStatus::Confirmed)
        }
    }

    #[tokio::test]
    async fn test_one_execution_per_credential() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 1, 1.02)]);
        let backend = Arc::new(SlowBackend {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });
        let engine = engine(backend.clone());
        let credential = Credential::from_hex(TEST_KEY).unwrap();

        let (a, b) = tokio::join!(
            engine.execute(&opp, 10.0, &credential, None),
            engine.execute(&opp, 10.0, &credential, None)
        );

        assert!(a.unwrap().is_success());
        assert!(b.unwrap().is_success());
        assert_eq!(backend.max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paper_backend_end_to_end() {
        let opp = opportunity(&[quote(1, 2, 1.02), quote(2, 3, 1.02), quote(3, 1, 1.02)]);
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let paper = Arc::new(PaperBackend::new(false));
        paper.deposit(credential.address(), token(1), 10.0);

        let result = engine(paper.clone()).execute(&opp, 10.0, &credential, None).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.signatures().len(), 3);
        assert!(paper.balance(credential.address(), token(1)) > 10.0);
    }
}
