use anchor_lang::prelude::*;

#[error_code]
pub enum SealgateError {
    #[msg("Content id exceeds the stored length budget")]
    InvalidContentIdLength,

    #[msg("Recipient account does not match the asset owner")]
    OwnerMismatch,

    #[msg("Unauthorized")]
    Unauthorized,
}
