pub mod asset;
pub mod entitlement;

pub use asset::*;
pub use entitlement::*;
