//! Deterministic account address derivation.
//!
//! Every account the program writes lives at an address computed from
//! public inputs: the asset record from its owner and content id, the
//! entitlement record from the asset address and the grantee. The
//! derivation searches bump 255 down to 0 for the first candidate that
//! falls off the ed25519 curve, so a derived address can never double
//! as a user-signable key.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::pubkey::{MAX_SEEDS, MAX_SEED_LEN};
use thiserror::Error;

/// Seed prefix for asset accounts.
pub const ASSET_SEED: &[u8] = b"asset";

/// Seed prefix for entitlement accounts.
pub const ACCESS_SEED: &[u8] = b"access";

/// Leading bytes of the content id used in asset derivation. The host
/// caps each seed at 32 bytes, so ids sharing this prefix derive the
/// same address; longer ids must be hashed upstream if that matters.
pub const CONTENT_ID_SEED_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("seed component {index} is {len} bytes, limit is {MAX_SEED_LEN}")]
    SeedTooLong { index: usize, len: usize },

    #[error("{count} seed components exceed the host limit of {}", MAX_SEEDS - 1)]
    TooManySeeds { count: usize },

    #[error("no viable bump seed for the given inputs")]
    BumpExhausted,
}

/// Derive a program address from raw seed components.
///
/// Component byte budgets are checked here so oversized inputs fail
/// before a transaction is ever built, not on-chain.
pub fn derive_address(
    program_id: &Pubkey,
    seeds: &[&[u8]],
) -> Result<(Pubkey, u8), DeriveError> {
    // The bump occupies one of the host's seed slots.
    if seeds.len() + 1 > MAX_SEEDS {
        return Err(DeriveError::TooManySeeds { count: seeds.len() });
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(DeriveError::SeedTooLong {
                index,
                len: seed.len(),
            });
        }
    }
    Pubkey::try_find_program_address(seeds, program_id).ok_or(DeriveError::BumpExhausted)
}

/// Address of the asset record for (owner, content_id).
pub fn derive_asset_address(
    program_id: &Pubkey,
    owner: &Pubkey,
    content_id: &str,
) -> Result<(Pubkey, u8), DeriveError> {
    derive_address(
        program_id,
        &[ASSET_SEED, owner.as_ref(), content_id_seed(content_id)],
    )
}

/// Address of the entitlement record for (asset, grantee).
pub fn derive_access_address(
    program_id: &Pubkey,
    asset: &Pubkey,
    grantee: &Pubkey,
) -> Result<(Pubkey, u8), DeriveError> {
    derive_address(
        program_id,
        &[ACCESS_SEED, asset.as_ref(), grantee.as_ref()],
    )
}

/// Leading bytes of the content id used as a derivation component,
/// clamped so ids shorter than the component width remain valid.
pub fn content_id_seed(content_id: &str) -> &[u8] {
    let bytes = content_id.as_bytes();
    &bytes[..bytes.len().min(CONTENT_ID_SEED_LEN)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PROGRAM_ID;

    fn pk(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    #[test]
    fn asset_derivation_is_deterministic() {
        let owner = pk(7);
        let a = derive_asset_address(&PROGRAM_ID, &owner, "arweave-hash-123").unwrap();
        let b = derive_asset_address(&PROGRAM_ID, &owner, "arweave-hash-123").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_inputs_produce_distinct_addresses() {
        let owner = pk(7);
        let (a, _) = derive_asset_address(&PROGRAM_ID, &owner, "content-a").unwrap();
        let (b, _) = derive_asset_address(&PROGRAM_ID, &owner, "content-b").unwrap();
        let (c, _) = derive_asset_address(&PROGRAM_ID, &pk(8), "content-a").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn content_id_shorter_than_seed_width_is_accepted() {
        let owner = pk(1);
        // 16 bytes, well under the 32-byte component width.
        let (addr, _) = derive_asset_address(&PROGRAM_ID, &owner, "short-content-id").unwrap();
        assert_ne!(addr, Pubkey::default());
    }

    #[test]
    fn content_ids_sharing_a_prefix_collide() {
        let owner = pk(2);
        let long_a = format!("{}{}", "p".repeat(32), "alpha");
        let long_b = format!("{}{}", "p".repeat(32), "beta");
        let (a, _) = derive_asset_address(&PROGRAM_ID, &owner, &long_a).unwrap();
        let (b, _) = derive_asset_address(&PROGRAM_ID, &owner, &long_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn oversized_seed_component_is_rejected() {
        let long = [0u8; 33];
        let err = derive_address(&PROGRAM_ID, &[ASSET_SEED, &long]).unwrap_err();
        assert_eq!(err, DeriveError::SeedTooLong { index: 1, len: 33 });
    }

    #[test]
    fn too_many_seed_components_are_rejected() {
        let seed: &[u8] = b"s";
        let seeds = [seed; 16];
        let err = derive_address(&PROGRAM_ID, &seeds).unwrap_err();
        assert_eq!(err, DeriveError::TooManySeeds { count: 16 });
    }

    #[test]
    fn derived_address_is_off_curve() {
        let owner = pk(3);
        let (addr, _) = derive_asset_address(&PROGRAM_ID, &owner, "curve-check").unwrap();
        assert!(!addr.is_on_curve());
    }
}
