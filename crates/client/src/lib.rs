//! Off-chain client for the sealgate program.
//!
//! The on-chain program records who owns which priced asset and who has
//! paid for access; this crate carries everything around that record:
//! deterministic address derivation, the instruction wire format, the
//! encrypt-upload and verify-decrypt pipelines, and the clients for the
//! storage, key custodian, and metadata services the pipelines talk to.

pub mod codec;
pub mod config;
pub mod content;
pub mod custodian;
pub mod derive;
pub mod ledger;
pub mod metadata;
pub mod pipeline;
pub mod rpc;
pub mod store;
pub mod verifier;
pub mod wallet;

/// In-memory stand-ins for the ledger, storage, and custodian services,
/// used by the integration tests and useful for downstream test suites.
pub mod testkit;

pub mod prelude {
    pub use crate::codec::{AssetAccount, CodecError, EntitlementAccount};
    pub use crate::config::PROGRAM_ID;
    pub use crate::content::{ContentError, ContentKey};
    pub use crate::custodian::{AccessPolicy, IdentityProof, KeyCustodian, SealedKey};
    pub use crate::derive::{derive_access_address, derive_asset_address, DeriveError};
    pub use crate::ledger::{LedgerError, LedgerReader, LedgerWriter, RejectReason};
    pub use crate::pipeline::{Pipeline, PublishRequest};
    pub use crate::store::{ContentId, ContentStore, Tag};
    pub use crate::verifier::{verify_access, Grant};
    pub use crate::wallet::{KeypairWallet, Wallet};
}
