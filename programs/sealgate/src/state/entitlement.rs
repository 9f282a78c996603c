use anchor_lang::prelude::*;

/// Entitlement State Account - one per (asset, grantee) pair
///
/// Existence of this account at its derived address is the sole proof
/// of entitlement; no field encodes more or less access than that.
#[account]
pub struct Entitlement {
    /// The asset this entitlement is for
    pub asset: Pubkey,

    /// The public key entitled to access the content
    pub grantee: Pubkey,

    /// PDA bump seed
    pub bump: u8,
}

impl Entitlement {
    /// Size calculation for account allocation
    /// Discriminator (8) + Pubkey (32) + Pubkey (32) + u8 (1)
    pub const LEN: usize = 8 + 32 + 32 + 1;

    /// PDA seed prefix
    pub const SEED_PREFIX: &'static [u8] = b"access";
}
