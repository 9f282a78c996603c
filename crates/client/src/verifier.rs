//! On-ledger access verification.
//!
//! Access to an asset is proven by ledger state alone: either the
//! requesting identity owns the asset record, or an entitlement record
//! exists at the address derived from (asset, identity). Callers get
//! back the decoded asset so they do not have to fetch it twice.

use anchor_lang::prelude::Pubkey;
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, AssetAccount, CodecError, EntitlementAccount};
use crate::derive::{derive_access_address, DeriveError};
use crate::ledger::{LedgerError, LedgerReader};

/// How the identity's access was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// The identity owns the asset record.
    Owner,
    /// An entitlement record exists for the identity.
    Entitled(EntitlementAccount),
}

/// A successful verification: the decoded asset plus the grant that
/// authorized access to it.
#[derive(Debug, Clone)]
pub struct Verified {
    pub asset_address: Pubkey,
    pub asset: AssetAccount,
    pub grant: Grant,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("asset {0} is not registered on the ledger")]
    AssetNotFound(Pubkey),

    #[error("no entitlement recorded for {identity} on asset {asset}")]
    NotEntitled { asset: Pubkey, identity: Pubkey },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Derive(#[from] DeriveError),
}

/// Decide whether `identity` may access the asset at `asset_address`.
///
/// Owners pass without an entitlement lookup. Everyone else must have
/// an entitlement record whose fields match the derived address, so a
/// record planted at the right address with the wrong contents still
/// fails.
pub async fn verify_access(
    ledger: &dyn LedgerReader,
    program_id: &Pubkey,
    asset_address: &Pubkey,
    identity: &Pubkey,
) -> Result<Verified, VerifyError> {
    let raw = ledger
        .fetch_account(asset_address)
        .await?
        .ok_or(VerifyError::AssetNotFound(*asset_address))?;
    let asset = codec::decode_asset(&raw.data)?;

    if asset.owner == *identity {
        debug!(asset = %asset_address, "requester owns the asset");
        return Ok(Verified {
            asset_address: *asset_address,
            asset,
            grant: Grant::Owner,
        });
    }

    let not_entitled = || VerifyError::NotEntitled {
        asset: *asset_address,
        identity: *identity,
    };

    let (entitlement_address, _) = derive_access_address(program_id, asset_address, identity)?;
    let raw = ledger
        .fetch_account(&entitlement_address)
        .await?
        .ok_or_else(not_entitled)?;
    let entitlement = codec::decode_entitlement(&raw.data)?;
    if entitlement.asset != *asset_address || entitlement.grantee != *identity {
        return Err(not_entitled());
    }

    debug!(asset = %asset_address, identity = %identity, "entitlement verified");
    Ok(Verified {
        asset_address: *asset_address,
        asset,
        grant: Grant::Entitled(entitlement),
    })
}
