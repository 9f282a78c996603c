//! Wallet capability boundary.
//!
//! The pipelines never see a concrete wallet. They depend on this
//! trait's four capabilities, and each backend (local keypair, browser
//! wallet bridge, hardware signer) implements them behind it.

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use thiserror::Error;

use crate::ledger::{LedgerError, LedgerWriter, TransactionEnvelope, SIGNATURE_LEN};

#[derive(Debug, Error)]
pub enum WalletError {
    /// The backend refused to sign, e.g. the user dismissed the prompt.
    #[error("wallet declined the request: {0}")]
    Declined(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The capabilities a wallet backend provides.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Identity used for address derivation, fee payment, and proofs.
    fn identity(&self) -> Pubkey;

    /// Sign an arbitrary byte statement, e.g. a key release proof.
    async fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], WalletError>;

    /// Fill in the envelope's signature slot.
    async fn sign_transaction(
        &self,
        envelope: &mut TransactionEnvelope,
    ) -> Result<(), WalletError>;

    /// Sign if needed and hand the envelope to the backend's ledger
    /// connection. Returns the transaction signature.
    async fn submit_transaction(
        &self,
        envelope: TransactionEnvelope,
    ) -> Result<String, WalletError>;
}

/// Wallet backed by a locally held ed25519 keypair and the ledger
/// connection it submits through.
pub struct KeypairWallet {
    signing_key: SigningKey,
    writer: Arc<dyn LedgerWriter>,
}

impl KeypairWallet {
    pub fn new(signing_key: SigningKey, writer: Arc<dyn LedgerWriter>) -> Self {
        Self {
            signing_key,
            writer,
        }
    }

    /// Fresh random keypair from a cryptographically secure RNG.
    pub fn generate(writer: Arc<dyn LedgerWriter>) -> Self {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        getrandom::getrandom(&mut seed).expect("failed to generate random bytes");
        Self::new(SigningKey::from_bytes(&seed), writer)
    }

    pub fn from_secret_bytes(seed: &[u8; SECRET_KEY_LENGTH], writer: Arc<dyn LedgerWriter>) -> Self {
        Self::new(SigningKey::from_bytes(seed), writer)
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn identity(&self) -> Pubkey {
        Pubkey::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], WalletError> {
        Ok(self.signing_key.sign(message).to_bytes())
    }

    async fn sign_transaction(
        &self,
        envelope: &mut TransactionEnvelope,
    ) -> Result<(), WalletError> {
        let signature = self.signing_key.sign(envelope.signing_payload()).to_bytes();
        envelope.attach_signature(signature);
        Ok(())
    }

    async fn submit_transaction(
        &self,
        mut envelope: TransactionEnvelope,
    ) -> Result<String, WalletError> {
        if !envelope.is_signed() {
            self.sign_transaction(&mut envelope).await?;
        }
        let wire = envelope.to_wire().map_err(WalletError::from)?;
        Ok(self.writer.send_transaction(&wire).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};

    struct NullWriter;

    #[async_trait]
    impl LedgerWriter for NullWriter {
        async fn send_transaction(&self, _wire: &[u8]) -> Result<String, LedgerError> {
            Ok("signature".to_string())
        }
    }

    #[tokio::test]
    async fn identity_matches_the_verifying_key() {
        let wallet = KeypairWallet::from_secret_bytes(&[3u8; 32], Arc::new(NullWriter));
        let signature = wallet.sign_message(b"statement").await.unwrap();

        let key = VerifyingKey::from_bytes(&wallet.identity().to_bytes()).unwrap();
        assert!(key
            .verify(b"statement", &ed25519_dalek::Signature::from_bytes(&signature))
            .is_ok());
    }

    #[tokio::test]
    async fn submit_signs_when_needed() {
        let wallet = KeypairWallet::from_secret_bytes(&[4u8; 32], Arc::new(NullWriter));
        let payer = wallet.identity();
        let instruction = crate::codec::purchase_asset_instruction(
            &crate::config::PROGRAM_ID,
            &payer,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        );
        let envelope = TransactionEnvelope::for_instruction(
            instruction,
            &payer,
            anchor_lang::solana_program::hash::Hash::default(),
        );
        assert!(wallet.submit_transaction(envelope).await.is_ok());
    }
}
