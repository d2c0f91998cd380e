//! Credential Module - Swap Instruction Signing
//!
//! This module handles:
//! - Loading the signing key
//! - Checking it against the public identity the operator supplied
//! - Signing instructions, batches and relay requests
//!
//! ⚠️  SECURITY WARNING:
//! - Never log or expose private keys
//! - Use environment variables, not hardcoded keys

use alloy_primitives::{keccak256, Address, Signature};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::plan::SwapInstruction;
use crate::errors::ExecutionError;

/// An instruction bound to a nonce and signed by a credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedInstruction {
    pub instruction: SwapInstruction,
    pub nonce: u64,
    pub signer: Address,
    /// `0x`-prefixed 65-byte signature
    pub signature: String,
}

/// Signed instructions plus one signature over the whole sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBatch {
    pub instructions: Vec<SignedInstruction>,
    pub signer: Address,
    pub batch_signature: String,
}

impl SignedBatch {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A signing key plus its nonce sequence
pub struct Credential {
    signer: PrivateKeySigner,
    next_nonce: AtomicU64,
}

impl Credential {
    /// Parse a hex private key, with or without `0x`
    pub fn from_hex(key: &str) -> Result<Self, ExecutionError> {
        let key = key.trim().trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|e| ExecutionError::Signing(format!("invalid private key: {}", e)))?;
        Ok(Self::from_signer(signer))
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            next_nonce: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The key must belong to the identity the operator claims
    pub fn verify_identity(&self, expected: Address) -> Result<(), ExecutionError> {
        let actual = self.address();
        if actual != expected {
            return Err(ExecutionError::IdentityMismatch { expected, actual });
        }
        Ok(())
    }

    /// Reserve the next nonce
    pub fn next_nonce(&self) -> u64 {
        self.next_nonce.fetch_add(1, Ordering::SeqCst)
    }

    async fn sign_bytes(&self, bytes: &[u8]) -> Result<Signature, ExecutionError> {
        let hash = keccak256(bytes);
        self.signer
            .sign_hash(&hash)
            .await
            .map_err(|e| ExecutionError::Signing(e.to_string()))
    }

    /// Sign `json(instruction) ‖ nonce`
    pub async fn sign_instruction(&self, instruction: &SwapInstruction) -> Result<SignedInstruction, ExecutionError> {
        let nonce = self.next_nonce();
        let mut payload = serde_json::to_vec(instruction)
            .map_err(|e| ExecutionError::Signing(format!("encoding instruction: {}", e)))?;
        payload.extend_from_slice(&nonce.to_be_bytes());

        let signature = self.sign_bytes(&payload).await?;
        debug!("Signed hop {} with nonce {}", instruction.hop, nonce);

        Ok(SignedInstruction {
            instruction: instruction.clone(),
            nonce,
            signer: self.address(),
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Sign every instruction in order
    pub async fn sign_all(&self, instructions: &[SwapInstruction]) -> Result<Vec<SignedInstruction>, ExecutionError> {
        let mut signed = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            signed.push(self.sign_instruction(instruction).await?);
        }
        Ok(signed)
    }

    /// Seal already-signed instructions into a batch
    ///
    /// The batch signature covers every instruction signature in order.
    pub async fn sign_batch(&self, instructions: Vec<SignedInstruction>) -> Result<SignedBatch, ExecutionError> {
        let digest_input = batch_digest_input(&instructions)?;
        let signature = self.sign_bytes(&digest_input).await?;
        Ok(SignedBatch {
            instructions,
            signer: self.address(),
            batch_signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Sign a relay request body
    /// Returns: "address:signature" as the relay expects in its header
    pub async fn sign_request(&self, body: &str) -> Result<String, ExecutionError> {
        let signature = self.sign_bytes(body.as_bytes()).await?;
        Ok(format!(
            "{:?}:0x{}",
            self.address(),
            hex::encode(signature.as_bytes())
        ))
    }
}

fn batch_digest_input(instructions: &[SignedInstruction]) -> Result<Vec<u8>, ExecutionError> {
    let mut bytes = Vec::with_capacity(instructions.len() * 65);
    for signed in instructions {
        let raw = hex::decode(signed.signature.trim_start_matches("0x"))
            .map_err(|e| ExecutionError::Signing(format!("bad signature hex: {}", e)))?;
        bytes.extend_from_slice(&raw);
    }
    Ok(bytes)
}

fn recover(signature_hex: &str, payload: &[u8]) -> Result<Address, ExecutionError> {
    let raw = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| ExecutionError::Signing(format!("bad signature hex: {}", e)))?;
    let signature = Signature::from_raw(&raw)
        .map_err(|e| ExecutionError::Signing(format!("bad signature: {}", e)))?;

    signature
        .recover_address_from_prehash(&keccak256(payload))
        .map_err(|e| ExecutionError::Signing(format!("recovery failed: {}", e)))
}

/// Recover the signer of a signed instruction
pub fn recover_signer(signed: &SignedInstruction) -> Result<Address, ExecutionError> {
    let mut payload = serde_json::to_vec(&signed.instruction)
        .map_err(|e| ExecutionError::Signing(format!("encoding instruction: {}", e)))?;
    payload.extend_from_slice(&signed.nonce.to_be_bytes());
    recover(&signed.signature, &payload)
}

/// Check that a batch and every instruction in it were signed by its signer
pub fn verify_batch(batch: &SignedBatch) -> Result<(), ExecutionError> {
    let batch_signer = recover(&batch.batch_signature, &batch_digest_input(&batch.instructions)?)?;
    if batch_signer != batch.signer {
        return Err(ExecutionError::IdentityMismatch {
            expected: batch.signer,
            actual: batch_signer,
        });
    }
    for signed in &batch.instructions {
        let actual = recover_signer(signed)?;
        if actual != batch.signer || signed.signer != batch.signer {
            return Err(ExecutionError::IdentityMismatch {
                expected: batch.signer,
                actual,
            });
        }
    }
    Ok(())
}

/// Generate a new random signing key
pub fn generate_credential() -> (String, Address) {
    let signer = PrivateKeySigner::random();
    let address = signer.address();

    let key_bytes = signer.credential().to_bytes();
    let private_key = format!("0x{}", hex::encode(key_bytes));

    (private_key, address)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Well-known development key, never funded
    pub(crate) const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn instruction(hop: usize) -> SwapInstruction {
        SwapInstruction {
            hop,
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            amount_in: 10.0,
            expected_out: 10.2,
            min_out: 10.098,
            fee_estimate: 0.0,
            gas: 5_000,
        }
    }

    #[test]
    fn test_generate_credential() {
        let (key, addr) = generate_credential();
        assert!(key.starts_with("0x"));
        assert_eq!(key.len(), 66);
        let credential = Credential::from_hex(&key).unwrap();
        assert_eq!(credential.address(), addr);
    }

    #[test]
    fn test_verify_identity() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert!(credential.verify_identity(expected).is_ok());

        let err = credential.verify_identity(Address::repeat_byte(9)).unwrap_err();
        assert!(matches!(err, ExecutionError::IdentityMismatch { .. }));
    }

    #[tokio::test]
    async fn test_signatures_recover_and_nonces_increase() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let signed = credential.sign_all(&[instruction(0), instruction(1)]).await.unwrap();

        assert_eq!(signed[0].nonce, 0);
        assert_eq!(signed[1].nonce, 1);
        for s in &signed {
            assert_eq!(recover_signer(s).unwrap(), credential.address());
        }
    }

    #[tokio::test]
    async fn test_batch_signature_verifies() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let signed = credential.sign_all(&[instruction(0), instruction(1)]).await.unwrap();
        let batch = credential.sign_batch(signed).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(verify_batch(&batch).is_ok());

        let mut tampered = batch.clone();
        tampered.instructions.swap(0, 1);
        assert!(verify_batch(&tampered).is_err());
    }

    #[tokio::test]
    async fn test_request_signing() {
        let credential = Credential::from_hex(TEST_KEY).unwrap();
        let header = credential.sign_request(r#"{"jsonrpc":"2.0","id":1}"#).await.unwrap();
        assert!(header.contains(':'));
        assert!(header.contains("0x"));
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(matches!(Credential::from_hex("not-a-key"), Err(ExecutionError::Signing(_))));
    }
}
