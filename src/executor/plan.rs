//! Transaction Builder
//!
//! Turns an accepted opportunity into ordered swap instructions, each with a
//! minimum-output guard, and simulates fees before anything is signed.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::brain::Opportunity;
use crate::errors::ExecutionError;

/// One swap in the sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapInstruction {
    pub hop: usize,
    pub from: Address,
    pub to: Address,
    pub amount_in: f64,
    pub expected_out: f64,
    /// Quoted output less slippage tolerance
    pub min_out: f64,
    /// Swap fee in input-token units plus gas in base-token units
    pub fee_estimate: f64,
    pub gas: u64,
}

/// Everything needed for one execution attempt
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPlan {
    pub instructions: Vec<SwapInstruction>,
    pub base_token: Address,
    pub amount_in: f64,
    pub expected_final: f64,
    pub gas_cost: f64,
    pub expected_net: f64,
}

impl TransactionPlan {
    pub fn hop_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn path(&self) -> Vec<Address> {
        let mut path: Vec<Address> = self.instructions.iter().map(|i| i.from).collect();
        path.push(self.base_token);
        path
    }
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    slippage: f64,
    gas_unit_price: f64,
    base_tokens: Vec<Address>,
}

impl TransactionBuilder {
    pub fn new(slippage: f64, gas_unit_price: f64, base_tokens: Vec<Address>) -> Self {
        Self {
            slippage,
            gas_unit_price,
            base_tokens,
        }
    }

    pub fn with_slippage(&self, slippage: f64) -> Self {
        Self {
            slippage,
            ..self.clone()
        }
    }

    /// Build and fee-check a plan for trading `amount` of the start token
    pub fn build(&self, opportunity: &Opportunity, amount: f64) -> Result<TransactionPlan, ExecutionError> {
        if !opportunity.accepted {
            return Err(ExecutionError::RiskRejected);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ExecutionError::InvalidPlan(format!("trade amount {} must be positive", amount)));
        }
        if !(0.0..1.0).contains(&self.slippage) {
            return Err(ExecutionError::InvalidPlan(format!(
                "slippage {} outside [0, 1)",
                self.slippage
            )));
        }
        if !opportunity.cycle.is_valid() {
            return Err(ExecutionError::InvalidPlan("cycle is not closed and simple".to_string()));
        }

        let start = self
            .base_tokens
            .iter()
            .find(|t| opportunity.cycle.contains_token(t))
            .copied()
            .or_else(|| opportunity.cycle.start_token())
            .ok_or_else(|| ExecutionError::InvalidPlan("empty cycle".to_string()))?;
        let cycle = opportunity
            .cycle
            .rotated_to(start)
            .ok_or_else(|| ExecutionError::InvalidPlan("base token not on cycle".to_string()))?;

        let mut instructions = Vec::with_capacity(cycle.hop_count());
        let mut running = amount;
        let mut gas_cost = 0.0;
        for (hop, edge) in cycle.hops.iter().enumerate() {
            let expected_out = running * edge.rate * (1.0 - edge.fee);
            let hop_gas_cost = edge.gas as f64 * self.gas_unit_price;
            gas_cost += hop_gas_cost;

            instructions.push(SwapInstruction {
                hop,
                from: edge.from,
                to: edge.to,
                amount_in: running,
                expected_out,
                min_out: expected_out * (1.0 - self.slippage),
                fee_estimate: running * edge.fee + hop_gas_cost,
                gas: edge.gas,
            });
            running = expected_out;
        }

        let expected_net = running - amount - gas_cost;
        debug!(
            "Simulated plan: in {:.6}, out {:.6}, gas {:.6}, net {:+.6}",
            amount, running, gas_cost, expected_net
        );
        if expected_net <= 0.0 {
            return Err(ExecutionError::NoProfitAfterFees { net: expected_net });
        }

        Ok(TransactionPlan {
            instructions,
            base_token: start,
            amount_in: amount,
            expected_final: running,
            gas_cost,
            expected_net,
        })
    }
}
