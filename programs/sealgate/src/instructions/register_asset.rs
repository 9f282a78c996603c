use anchor_lang::prelude::*;

use crate::constants::MAX_CONTENT_ID_LEN;
use crate::errors::*;
use crate::state::*;

/// Create the asset record at its derived address
pub fn register_asset(
    ctx: Context<RegisterAsset>,
    price: u64,
    content_id: String,
) -> Result<()> {
    require!(
        content_id.len() <= MAX_CONTENT_ID_LEN,
        SealgateError::InvalidContentIdLength
    );

    let asset = &mut ctx.accounts.asset;
    asset.owner = ctx.accounts.creator.key();
    asset.price = price;
    asset.content_id = content_id;
    asset.bump = ctx.bumps.asset;

    msg!(
        "Asset registered by creator: {}, price: {} lamports",
        asset.owner,
        asset.price
    );

    Ok(())
}

#[derive(Accounts)]
#[instruction(price: u64, content_id: String)]
pub struct RegisterAsset<'info> {
    /// The creator who owns the content
    #[account(mut)]
    pub creator: Signer<'info>,

    /// Asset state PDA
    #[account(
        init,
        payer = creator,
        space = Asset::LEN,
        seeds = [
            Asset::SEED_PREFIX,
            creator.key().as_ref(),
            Asset::content_id_seed(&content_id),
        ],
        bump
    )]
    pub asset: Account<'info, Asset>,

    /// System program
    pub system_program: Program<'info, System>,
}
