//! Custodian holding its master key in process.
//!
//! Sealing never consults the ledger; at publish time the asset is not
//! registered yet. Release is where the policy bites: the requester
//! must present a fresh signed proof, the sealed blob must carry the
//! digest of the policy being invoked, and the ledger must show the
//! requester as the asset owner or the holder of a matching
//! entitlement record.

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::codec;
use crate::config::{now_unix, PROOF_TTL_SECS};
use crate::content::{self, ContentKey};
use crate::custodian::{AccessPolicy, CustodianError, IdentityProof, KeyCustodian, SealedKey};
use crate::derive::derive_access_address;
use crate::ledger::LedgerReader;

pub struct InProcessCustodian {
    master: ContentKey,
    ledger: Arc<dyn LedgerReader>,
}

impl InProcessCustodian {
    pub fn new(ledger: Arc<dyn LedgerReader>) -> Self {
        Self {
            master: ContentKey::generate(),
            ledger,
        }
    }

    fn check_proof(
        &self,
        proof: &IdentityProof,
        policy: &AccessPolicy,
    ) -> Result<(), CustodianError> {
        if !proof.verify(policy) {
            return Err(CustodianError::InvalidProof);
        }
        if !proof.is_fresh(now_unix(), PROOF_TTL_SECS) {
            return Err(CustodianError::StaleProof);
        }
        Ok(())
    }

    /// The release policy: `identity` owns the asset or holds an
    /// entitlement record whose fields match the derived address.
    async fn evaluate(
        &self,
        policy: &AccessPolicy,
        identity: &Pubkey,
    ) -> Result<(), CustodianError> {
        let denied = |reason: String| CustodianError::PolicyDenied(reason);

        let raw = self
            .ledger
            .fetch_account(&policy.asset)
            .await?
            .ok_or_else(|| denied(format!("asset {} is not registered", policy.asset)))?;
        let asset = codec::decode_asset(&raw.data)
            .map_err(|_| denied("asset record is unreadable".to_string()))?;
        if asset.owner == *identity {
            return Ok(());
        }

        let (entitlement_address, _) =
            derive_access_address(&policy.program, &policy.asset, identity)
                .map_err(|e| denied(e.to_string()))?;
        let raw = self
            .ledger
            .fetch_account(&entitlement_address)
            .await?
            .ok_or_else(|| denied(format!("no entitlement recorded for {identity}")))?;
        let entitlement = codec::decode_entitlement(&raw.data)
            .map_err(|_| denied("entitlement record is unreadable".to_string()))?;
        if entitlement.asset != policy.asset || entitlement.grantee != *identity {
            return Err(denied(
                "entitlement record does not match the requested asset".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyCustodian for InProcessCustodian {
    async fn seal(
        &self,
        key: &ContentKey,
        policy: &AccessPolicy,
        proof: &IdentityProof,
    ) -> Result<SealedKey, CustodianError> {
        self.check_proof(proof, policy)?;
        let ciphertext = content::encrypt(&self.master, key.as_bytes())?;
        Ok(SealedKey {
            ciphertext,
            policy_digest: policy.digest(),
        })
    }

    async fn release(
        &self,
        sealed: &SealedKey,
        policy: &AccessPolicy,
        proof: &IdentityProof,
    ) -> Result<ContentKey, CustodianError> {
        self.check_proof(proof, policy)?;
        if sealed.policy_digest != policy.digest() {
            return Err(CustodianError::PolicyMismatch);
        }
        self.evaluate(policy, &proof.identity).await?;
        let key_bytes = Zeroizing::new(content::decrypt(&self.master, &sealed.ciphertext)?);
        Ok(ContentKey::from_slice(&key_bytes)?)
    }
}
