//! Keypair wallet wired to the in-memory ledger, with a hook for
//! simulating a user dismissing the approval prompt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};

use crate::ledger::{LedgerWriter, TransactionEnvelope, SIGNATURE_LEN};
use crate::testkit::MemoryLedger;
use crate::wallet::{Wallet, WalletError};

pub struct MemoryWallet {
    signing_key: SigningKey,
    ledger: MemoryLedger,
    decline_next: Arc<AtomicBool>,
}

impl MemoryWallet {
    pub fn generate(ledger: &MemoryLedger) -> Self {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        getrandom::getrandom(&mut seed).expect("failed to generate random bytes");
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            ledger: ledger.clone(),
            decline_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Generate a wallet and airdrop it a starting balance.
    pub fn funded(ledger: &MemoryLedger, lamports: u64) -> Self {
        let wallet = Self::generate(ledger);
        ledger.airdrop(&wallet.identity(), lamports);
        wallet
    }

    /// The next signing request is declined, as if the user dismissed
    /// the prompt.
    pub fn decline_next(&self) {
        self.decline_next.store(true, Ordering::SeqCst);
    }

    fn check_declined(&self) -> Result<(), WalletError> {
        if self.decline_next.swap(false, Ordering::SeqCst) {
            return Err(WalletError::Declined(
                "signature request dismissed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    fn identity(&self) -> Pubkey {
        Pubkey::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], WalletError> {
        self.check_declined()?;
        Ok(self.signing_key.sign(message).to_bytes())
    }

    async fn sign_transaction(
        &self,
        envelope: &mut TransactionEnvelope,
    ) -> Result<(), WalletError> {
        self.check_declined()?;
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
        Ok(self.ledger.send_transaction(&envelope.to_wire()?).await?)
    }
}
