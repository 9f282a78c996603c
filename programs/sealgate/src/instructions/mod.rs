pub mod register_asset;
pub mod purchase_asset;
pub mod grant_access;

pub use register_asset::*;
pub use purchase_asset::*;
pub use grant_access::*;
