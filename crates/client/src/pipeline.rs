//! Publish and open protocols.
//!
//! Publishing runs encrypt, upload, seal, and register in a fixed
//! order so that a failure at any step leaves nothing exploitable
//! behind: ciphertext without a registered asset is unreadable, and a
//! sealed key without an entitlement is unreleasable. Each failure
//! reports the last completed step as a [`PublishCheckpoint`] so the
//! caller can resume without re-uploading.
//!
//! Opening is the mirror image: prove access against the ledger, have
//! the custodian release the key, fetch the ciphertext, decrypt.

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{self, CodecError};
use crate::content::{self, ContentError, ContentKey};
use crate::custodian::{AccessPolicy, CustodianError, IdentityProof, KeyCustodian, SealedKey};
use crate::derive::{derive_asset_address, DeriveError};
use crate::ledger::{LedgerError, LedgerReader, TransactionEnvelope};
use crate::store::{ContentId, ContentStore, StoreError, Tag};
use crate::verifier::{verify_access, Grant, VerifyError};
use crate::wallet::{Wallet, WalletError};

/// Everything needed to publish one piece of content.
pub struct PublishRequest {
    pub plaintext: Vec<u8>,
    /// Price in lamports a buyer pays for an entitlement.
    pub price: u64,
    pub tags: Vec<Tag>,
}

/// Proof of a completed publish. Carries everything a storefront needs
/// to compose a listing without re-reading the ledger.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub asset_address: Pubkey,
    pub content_id: ContentId,
    /// Price in lamports recorded on the asset.
    pub price: u64,
    pub sealed_key: SealedKey,
    pub transaction_signature: String,
}

/// Last durable step a failed publish completed. Feed it back into
/// [`Pipeline::resume_publish`] to pick up where the run stopped.
#[derive(Debug, Clone)]
pub enum PublishCheckpoint {
    /// Nothing durable happened; run publish again from the top.
    Nothing,
    /// Ciphertext is stored but the key is not sealed yet. The raw key
    /// must be kept until sealing succeeds or the upload is abandoned.
    Uploaded {
        content_id: ContentId,
        key: ContentKey,
    },
    /// Key is sealed; only the ledger registration is missing.
    Sealed {
        content_id: ContentId,
        sealed_key: SealedKey,
    },
}

impl PublishCheckpoint {
    fn describe(&self) -> &'static str {
        match self {
            PublishCheckpoint::Nothing => "start",
            PublishCheckpoint::Uploaded { .. } => "upload",
            PublishCheckpoint::Sealed { .. } => "seal",
        }
    }
}

/// A failed publish: the step that broke plus the last checkpoint
/// worth resuming from.
#[derive(Debug, Error)]
#[error("publish halted after step `{}`: {cause}", checkpoint.describe())]
pub struct PublishError {
    pub checkpoint: PublishCheckpoint,
    #[source]
    pub cause: PublishFailure,
}

impl PublishError {
    fn at(checkpoint: PublishCheckpoint, cause: impl Into<PublishFailure>) -> Self {
        let cause = cause.into();
        warn!(
            completed = checkpoint.describe(),
            error = %cause,
            "publish halted"
        );
        Self { checkpoint, cause }
    }
}

#[derive(Debug, Error)]
pub enum PublishFailure {
    #[error(transparent)]
    Encrypt(#[from] ContentError),

    #[error(transparent)]
    Upload(#[from] StoreError),

    #[error(transparent)]
    Seal(#[from] CustodianError),

    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("nothing durable to resume from; run publish again")]
    NothingToResume,
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("key release failed: {0}")]
    Release(#[source] CustodianError),

    #[error("ciphertext fetch failed: {0}")]
    Fetch(#[source] StoreError),

    #[error(transparent)]
    Decrypt(#[from] ContentError),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// Wires the wallet, ledger, store, and custodian into the publish and
/// open protocols.
pub struct Pipeline {
    wallet: Arc<dyn Wallet>,
    ledger: Arc<dyn LedgerReader>,
    store: Arc<dyn ContentStore>,
    custodian: Arc<dyn KeyCustodian>,
    program_id: Pubkey,
}

impl Pipeline {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn LedgerReader>,
        store: Arc<dyn ContentStore>,
        custodian: Arc<dyn KeyCustodian>,
        program_id: Pubkey,
    ) -> Self {
        Self {
            wallet,
            ledger,
            store,
            custodian,
            program_id,
        }
    }

    /// Encrypt, upload, seal, register. On failure the error carries
    /// the furthest checkpoint reached.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishReceipt, PublishError> {
        info!(
            bytes = request.plaintext.len(),
            price = request.price,
            "publishing content"
        );
        let key = ContentKey::generate();
        let sealed_payload = content::encrypt(&key, &request.plaintext)
            .map_err(|e| PublishError::at(PublishCheckpoint::Nothing, e))?;

        let content_id = self
            .store
            .put(sealed_payload, &request.tags)
            .await
            .map_err(|e| PublishError::at(PublishCheckpoint::Nothing, e))?;
        debug!(%content_id, "ciphertext stored");

        self.seal_and_register(key, content_id, request.price).await
    }

    /// Continue a publish from a checkpoint returned by an earlier
    /// failure. `price` must match the original request.
    pub async fn resume_publish(
        &self,
        checkpoint: PublishCheckpoint,
        price: u64,
    ) -> Result<PublishReceipt, PublishError> {
        match checkpoint {
            PublishCheckpoint::Nothing => Err(PublishError::at(
                PublishCheckpoint::Nothing,
                PublishFailure::NothingToResume,
            )),
            PublishCheckpoint::Uploaded { content_id, key } => {
                info!(%content_id, "resuming publish from stored ciphertext");
                self.seal_and_register(key, content_id, price).await
            }
            PublishCheckpoint::Sealed {
                content_id,
                sealed_key,
            } => {
                info!(%content_id, "resuming publish from sealed key");
                self.register(content_id, sealed_key, price).await
            }
        }
    }

    async fn seal_and_register(
        &self,
        key: ContentKey,
        content_id: ContentId,
        price: u64,
    ) -> Result<PublishReceipt, PublishError> {
        let reached = || PublishCheckpoint::Uploaded {
            content_id: content_id.clone(),
            key: key.clone(),
        };

        let identity = self.wallet.identity();
        let (asset_address, _) =
            derive_asset_address(&self.program_id, &identity, content_id.as_str())
                .map_err(|e| PublishError::at(reached(), e))?;
        let policy = AccessPolicy::entitlement_exists(self.program_id, asset_address);
        let proof = IdentityProof::sign(self.wallet.as_ref(), &policy)
            .await
            .map_err(|e| PublishError::at(reached(), e))?;
        let sealed_key = self
            .custodian
            .seal(&key, &policy, &proof)
            .await
            .map_err(|e| PublishError::at(reached(), e))?;
        // The raw key is dropped (and zeroed) here; from now on only
        // the custodian can produce it again.
        drop(key);
        debug!(%asset_address, "content key sealed");

        self.register(content_id, sealed_key, price).await
    }

    async fn register(
        &self,
        content_id: ContentId,
        sealed_key: SealedKey,
        price: u64,
    ) -> Result<PublishReceipt, PublishError> {
        let reached = || PublishCheckpoint::Sealed {
            content_id: content_id.clone(),
            sealed_key: sealed_key.clone(),
        };

        let identity = self.wallet.identity();
        let (asset_address, _) =
            derive_asset_address(&self.program_id, &identity, content_id.as_str())
                .map_err(|e| PublishError::at(reached(), e))?;
        let instruction = codec::register_asset_instruction(
            &self.program_id,
            &identity,
            &asset_address,
            price,
            content_id.as_str(),
        )
        .map_err(|e| PublishError::at(reached(), e))?;
        let blockhash = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(|e| PublishError::at(reached(), e))?;
        let envelope = TransactionEnvelope::for_instruction(instruction, &identity, blockhash);
        let transaction_signature = self
            .wallet
            .submit_transaction(envelope)
            .await
            .map_err(|e| PublishError::at(reached(), e))?;

        info!(%asset_address, signature = %transaction_signature, "asset registered");
        Ok(PublishReceipt {
            asset_address,
            content_id,
            price,
            sealed_key,
            transaction_signature,
        })
    }

    /// Prove access, release the key, fetch and decrypt the content.
    pub async fn open(
        &self,
        asset_address: &Pubkey,
        sealed_key: &SealedKey,
    ) -> Result<Vec<u8>, OpenError> {
        let identity = self.wallet.identity();
        let verified =
            verify_access(self.ledger.as_ref(), &self.program_id, asset_address, &identity).await?;
        match &verified.grant {
            Grant::Owner => debug!(asset = %asset_address, "opening as owner"),
            Grant::Entitled(_) => debug!(asset = %asset_address, "opening with entitlement"),
        }

        let policy = AccessPolicy::entitlement_exists(self.program_id, *asset_address);
        let proof = IdentityProof::sign(self.wallet.as_ref(), &policy).await?;
        let key = self
            .custodian
            .release(sealed_key, &policy, &proof)
            .await
            .map_err(OpenError::Release)?;

        let content_id = ContentId::new(verified.asset.content_id.clone());
        let ciphertext = self
            .store
            .get(&content_id)
            .await
            .map_err(OpenError::Fetch)?;
        let plaintext = content::decrypt(&key, &ciphertext)?;
        info!(asset = %asset_address, bytes = plaintext.len(), "content opened");
        Ok(plaintext)
    }
}
