use anchor_lang::prelude::*;

use crate::constants::{CONTENT_ID_SEED_LEN, MAX_CONTENT_ID_LEN};

/// Asset State Account - one per registered item
#[account]
pub struct Asset {
    /// The creator's public key, receives every sale
    pub owner: Pubkey,

    /// Price in lamports
    pub price: u64,

    /// Storage address of the encrypted content
    pub content_id: String,

    /// PDA bump seed
    pub bump: u8,
}

impl Asset {
    /// Size calculation for account allocation
    /// Discriminator (8) + Pubkey (32) + u64 (8) + String (4 + 64) + u8 (1)
    pub const LEN: usize = 8 + 32 + 8 + 4 + MAX_CONTENT_ID_LEN + 1;

    /// PDA seed prefix
    pub const SEED_PREFIX: &'static [u8] = b"asset";

    /// Leading bytes of the content id used as a derivation seed.
    /// Clamped so ids shorter than the seed width remain valid; ids
    /// sharing a 32-byte prefix derive the same address.
    pub fn content_id_seed(content_id: &str) -> &[u8] {
        let bytes = content_id.as_bytes();
        &bytes[..bytes.len().min(CONTENT_ID_SEED_LEN)]
    }
}
