#![allow(unexpected_cfgs, deprecated)]
use anchor_lang::prelude::*;

declare_id!("EhsDqCSNL6FWnYryn6bM2wQFX8ZrSuJiHfiaiNk5aD9d");

pub mod constants;
pub mod state;
pub mod instructions;
pub mod errors;

use instructions::*;

#[program]
pub mod sealgate {
    use super::*;

    /// Register a priced asset for sale
    ///
    /// # Arguments
    /// * `price` - Price in lamports the buyer must pay
    /// * `content_id` - Storage address of the encrypted content (max 64 bytes)
    pub fn register_asset(
        ctx: Context<RegisterAsset>,
        price: u64,
        content_id: String,
    ) -> Result<()> {
        instructions::register_asset::register_asset(ctx, price, content_id)
    }

    /// Pay the asset price and record an entitlement atomically
    pub fn purchase_asset(ctx: Context<PurchaseAsset>) -> Result<()> {
        instructions::purchase_asset::purchase_asset(ctx)
    }

    /// Record an entitlement for free, signed by the asset owner
    pub fn grant_access(ctx: Context<GrantAccess>) -> Result<()> {
        instructions::grant_access::grant_access(ctx)
    }
}
