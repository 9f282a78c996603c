use anchor_lang::prelude::*;
use anchor_lang::system_program::{transfer, Transfer};

use crate::errors::*;
use crate::state::*;

/// Pay the asset price and record the buyer's entitlement
///
/// The entitlement account is created during account validation, so a
/// repeat purchase for the same (asset, buyer) pair fails before any
/// lamports move.
pub fn purchase_asset(ctx: Context<PurchaseAsset>) -> Result<()> {
    let asset = &ctx.accounts.asset;

    // Validate that the payment recipient is the recorded owner
    require_keys_eq!(
        asset.owner,
        ctx.accounts.creator.key(),
        SealgateError::OwnerMismatch
    );

    // Transfer the full price from buyer to creator
    transfer(
        CpiContext::new(
            ctx.accounts.system_program.to_account_info(),
            Transfer {
                from: ctx.accounts.buyer.to_account_info(),
                to: ctx.accounts.creator.to_account_info(),
            },
        ),
        asset.price,
    )?;

    let entitlement = &mut ctx.accounts.entitlement;
    entitlement.asset = ctx.accounts.asset.key();
    entitlement.grantee = ctx.accounts.buyer.key();
    entitlement.bump = ctx.bumps.entitlement;

    msg!(
        "Payment of {} received from buyer: {}",
        asset.price,
        entitlement.grantee
    );

    Ok(())
}

#[derive(Accounts)]
pub struct PurchaseAsset<'info> {
    /// The buyer paying for access
    #[account(mut)]
    pub buyer: Signer<'info>,

    /// Entitlement state PDA, created exactly once per (asset, buyer)
    #[account(
        init,
        payer = buyer,
        space = Entitlement::LEN,
        seeds = [
            Entitlement::SEED_PREFIX,
            asset.key().as_ref(),
            buyer.key().as_ref(),
        ],
        bump
    )]
    pub entitlement: Account<'info, Entitlement>,

    /// The asset being purchased
    #[account(
        seeds = [
            Asset::SEED_PREFIX,
            asset.owner.as_ref(),
            Asset::content_id_seed(&asset.content_id),
        ],
        bump = asset.bump,
    )]
    pub asset: Account<'info, Asset>,

    /// The asset owner who receives the payment
    /// CHECK: Verified against asset.owner in the handler
    #[account(mut)]
    pub creator: UncheckedAccount<'info>,

    /// System program
    pub system_program: Program<'info, System>,
}
