//! In-memory stand-ins for the external systems the client talks to.
//!
//! Each piece implements the same trait the production client does, so
//! the full publish/purchase/open flow runs in-process with no network
//! and no validator. The ledger model reproduces the host's visible
//! behavior for this program's transactions: rent and fee accounting,
//! occupied-address rejections, and the error log lines the real node
//! would return.

pub mod custodian;
pub mod ledger;
pub mod store;
pub mod wallet;

pub use custodian::InProcessCustodian;
pub use ledger::{rent_exempt_minimum, MemoryLedger, TX_FEE};
pub use store::MemoryStore;
pub use wallet::MemoryWallet;
