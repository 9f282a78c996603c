use anchor_lang::prelude::*;

use crate::errors::*;
use crate::state::*;

/// Record an entitlement with no funds transfer, signed by the owner
pub fn grant_access(ctx: Context<GrantAccess>) -> Result<()> {
    let asset = &ctx.accounts.asset;

    // Only the asset owner may grant free access
    require_keys_eq!(
        asset.owner,
        ctx.accounts.creator.key(),
        SealgateError::Unauthorized
    );

    let entitlement = &mut ctx.accounts.entitlement;
    entitlement.asset = ctx.accounts.asset.key();
    entitlement.grantee = ctx.accounts.grantee.key();
    entitlement.bump = ctx.bumps.entitlement;

    msg!(
        "Access granted to {} by owner: {}",
        entitlement.grantee,
        asset.owner
    );

    Ok(())
}

#[derive(Accounts)]
pub struct GrantAccess<'info> {
    /// The asset owner funding the entitlement account
    #[account(mut)]
    pub creator: Signer<'info>,

    /// Entitlement state PDA, created exactly once per (asset, grantee)
    #[account(
        init,
        payer = creator,
        space = Entitlement::LEN,
        seeds = [
            Entitlement::SEED_PREFIX,
            asset.key().as_ref(),
            grantee.key().as_ref(),
        ],
        bump
    )]
    pub entitlement: Account<'info, Entitlement>,

    /// The asset access is granted for
    #[account(
        seeds = [
            Asset::SEED_PREFIX,
            asset.owner.as_ref(),
            Asset::content_id_seed(&asset.content_id),
        ],
        bump = asset.bump,
    )]
    pub asset: Account<'info, Asset>,

    /// The public key receiving access
    /// CHECK: Any address may be granted access
    pub grantee: UncheckedAccount<'info>,

    /// System program
    pub system_program: Program<'info, System>,
}
