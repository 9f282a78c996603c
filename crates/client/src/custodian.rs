//! Key custody: sealing content keys and releasing them to entitled
//! identities.
//!
//! A custodian never hands out a raw content key on trust. Every
//! release request carries an [`AccessPolicy`] naming the asset whose
//! on-ledger entitlement must exist, and an [`IdentityProof`] showing
//! the requester controls the keypair the entitlement was granted to.
//! The sealed blob itself is bound to the policy digest, so a key
//! sealed under one asset can never be released under another.

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{now_unix, POLICY_DOMAIN, RELEASE_DOMAIN, SERVICE_TIMEOUT};
use crate::content::{ContentError, ContentKey};
use crate::ledger::LedgerError;
use crate::wallet::{Wallet, WalletError};

/// Release condition for a sealed key: a verified entitlement for the
/// requesting identity must exist on the named asset (the asset owner
/// passes implicitly).
///
/// The policy is a concrete claim about ledger state, checked by the
/// custodian at release time. There is no way to express an
/// unconditional release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub program: Pubkey,
    pub asset: Pubkey,
}

impl AccessPolicy {
    pub fn entitlement_exists(program: Pubkey, asset: Pubkey) -> Self {
        Self { program, asset }
    }

    /// Domain-separated digest the sealed blob and release proofs are
    /// bound to.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(POLICY_DOMAIN);
        hasher.update(self.program.as_ref());
        hasher.update(self.asset.as_ref());
        hasher.finalize().into()
    }
}

/// A content key encrypted under custodian-held key material, bound to
/// the policy it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKey {
    pub ciphertext: Vec<u8>,
    pub policy_digest: [u8; 32],
}

impl SealedKey {
    /// Ciphertext as base64, the form listings store.
    pub fn ciphertext_base64(&self) -> String {
        BASE64.encode(&self.ciphertext)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.policy_digest)
    }

    /// Rebuild a sealed key from its listing representation.
    pub fn from_parts(ciphertext_base64: &str, digest_hex: &str) -> Result<Self, CustodianError> {
        let ciphertext = BASE64
            .decode(ciphertext_base64)
            .map_err(|e| CustodianError::InvalidResponse(format!("sealed key encoding: {e}")))?;
        let digest = hex::decode(digest_hex)
            .map_err(|e| CustodianError::InvalidResponse(format!("policy digest encoding: {e}")))?;
        let policy_digest: [u8; 32] = digest
            .try_into()
            .map_err(|_| CustodianError::InvalidResponse("policy digest length".to_string()))?;
        Ok(Self {
            ciphertext,
            policy_digest,
        })
    }
}

/// Signed statement that the holder of `identity` requested a key
/// operation for a specific policy at a specific time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProof {
    pub identity: Pubkey,
    pub issued_at: u64,
    pub signature: [u8; 64],
}

impl IdentityProof {
    /// Have the wallet sign a release statement for `policy`, stamped
    /// with the current time.
    pub async fn sign(wallet: &dyn Wallet, policy: &AccessPolicy) -> Result<Self, WalletError> {
        let identity = wallet.identity();
        let issued_at = now_unix();
        let statement = release_statement(&policy.digest(), &identity, issued_at);
        let signature = wallet.sign_message(&statement).await?;
        Ok(Self {
            identity,
            issued_at,
            signature,
        })
    }

    /// Check the signature against the statement this proof claims to
    /// cover.
    pub fn verify(&self, policy: &AccessPolicy) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.identity.to_bytes()) else {
            return false;
        };
        let statement = release_statement(&policy.digest(), &self.identity, self.issued_at);
        key.verify(&statement, &Signature::from_bytes(&self.signature))
            .is_ok()
    }

    /// A proof is fresh while its timestamp is at most `ttl` seconds in
    /// the past. Future-dated proofs are never fresh.
    pub fn is_fresh(&self, now: u64, ttl: u64) -> bool {
        now.checked_sub(self.issued_at)
            .is_some_and(|age| age <= ttl)
    }
}

/// The exact bytes an identity signs to request a key release.
pub fn release_statement(policy_digest: &[u8; 32], identity: &Pubkey, issued_at: u64) -> Vec<u8> {
    let mut statement = Vec::with_capacity(RELEASE_DOMAIN.len() + 32 + 32 + 8);
    statement.extend_from_slice(RELEASE_DOMAIN);
    statement.extend_from_slice(policy_digest);
    statement.extend_from_slice(identity.as_ref());
    statement.extend_from_slice(&issued_at.to_le_bytes());
    statement
}

#[derive(Debug, Error)]
pub enum CustodianError {
    /// The policy check failed: no entitlement exists for the
    /// requesting identity. Distinct from transport and proof errors so
    /// callers can tell "not yours" apart from "try again".
    #[error("key release denied: {0}")]
    PolicyDenied(String),

    #[error("sealed key is bound to a different policy")]
    PolicyMismatch,

    #[error("release proof signature is invalid")]
    InvalidProof,

    #[error("release proof has expired")]
    StaleProof,

    #[error("custodian ledger read failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("custodian transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("custodian returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed custodian response: {0}")]
    InvalidResponse(String),
}

/// Seals content keys at publish time and releases them to entitled
/// identities at open time.
#[async_trait]
pub trait KeyCustodian: Send + Sync {
    /// Encrypt `key` under custodian key material, bound to `policy`.
    async fn seal(
        &self,
        key: &ContentKey,
        policy: &AccessPolicy,
        proof: &IdentityProof,
    ) -> Result<SealedKey, CustodianError>;

    /// Return the raw content key if `proof` is valid and the policy
    /// holds for the proven identity.
    async fn release(
        &self,
        sealed: &SealedKey,
        policy: &AccessPolicy,
        proof: &IdentityProof,
    ) -> Result<ContentKey, CustodianError>;
}

/// Client for a remote custodian service.
pub struct HttpCustodian {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct PolicyDto {
    program: String,
    asset: String,
}

impl PolicyDto {
    fn from_policy(policy: &AccessPolicy) -> Self {
        Self {
            program: policy.program.to_string(),
            asset: policy.asset.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ProofDto {
    identity: String,
    issued_at: u64,
    signature: String,
}

impl ProofDto {
    fn from_proof(proof: &IdentityProof) -> Self {
        Self {
            identity: proof.identity.to_string(),
            issued_at: proof.issued_at,
            signature: hex::encode(proof.signature),
        }
    }
}

#[derive(Serialize)]
struct SealRequest<'a> {
    policy: PolicyDto,
    key: &'a str,
    proof: ProofDto,
}

#[derive(Deserialize)]
struct SealResponse {
    sealed_key: String,
    policy_digest: String,
}

#[derive(Serialize)]
struct ReleaseRequest {
    policy: PolicyDto,
    sealed_key: String,
    policy_digest: String,
    proof: ProofDto,
}

#[derive(Deserialize)]
struct ReleaseResponse {
    key: String,
}

impl HttpCustodian {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CustodianError> {
        let http = reqwest::Client::builder().timeout(SERVICE_TIMEOUT).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, http })
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, CustodianError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(CustodianError::PolicyDenied(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CustodianError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| CustodianError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl KeyCustodian for HttpCustodian {
    async fn seal(
        &self,
        key: &ContentKey,
        policy: &AccessPolicy,
        proof: &IdentityProof,
    ) -> Result<SealedKey, CustodianError> {
        let key_hex = Zeroizing::new(key.to_hex());
        let request = SealRequest {
            policy: PolicyDto::from_policy(policy),
            key: &key_hex,
            proof: ProofDto::from_proof(proof),
        };
        let response: SealResponse = self.post("/seal", &request).await?;
        debug!(asset = %policy.asset, "content key sealed by custodian");
        SealedKey::from_parts(&response.sealed_key, &response.policy_digest)
    }

    async fn release(
        &self,
        sealed: &SealedKey,
        policy: &AccessPolicy,
        proof: &IdentityProof,
    ) -> Result<ContentKey, CustodianError> {
        let request = ReleaseRequest {
            policy: PolicyDto::from_policy(policy),
            sealed_key: sealed.ciphertext_base64(),
            policy_digest: sealed.digest_hex(),
            proof: ProofDto::from_proof(proof),
        };
        let response: ReleaseResponse = self.post("/release", &request).await?;
        let key_bytes = Zeroizing::new(
            hex::decode(&response.key)
                .map_err(|e| CustodianError::InvalidResponse(format!("key encoding: {e}")))?,
        );
        let key = ContentKey::from_slice(&key_bytes)
            .map_err(|e| CustodianError::InvalidResponse(e.to_string()))?;
        debug!(asset = %policy.asset, identity = %proof.identity, "content key released");
        Ok(key)
    }
}
