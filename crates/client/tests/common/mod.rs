#![allow(dead_code)]

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;

use sealgate_client::codec;
use sealgate_client::config::PROGRAM_ID;
use sealgate_client::derive::{derive_access_address, derive_asset_address};
use sealgate_client::ledger::{LedgerError, LedgerReader, RejectReason, TransactionEnvelope};
use sealgate_client::pipeline::Pipeline;
use sealgate_client::testkit::{InProcessCustodian, MemoryLedger, MemoryStore, MemoryWallet};
use sealgate_client::wallet::{Wallet, WalletError};

pub const SOL: u64 = 1_000_000_000;

/// Honor RUST_LOG when the tests run with output enabled.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One ledger, store, and custodian shared by every participant in a
/// test.
pub struct Fixture {
    pub ledger: MemoryLedger,
    pub store: MemoryStore,
    pub custodian: Arc<InProcessCustodian>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let ledger = MemoryLedger::new(PROGRAM_ID);
        let store = MemoryStore::new();
        let custodian = Arc::new(InProcessCustodian::new(Arc::new(ledger.clone())));
        Self {
            ledger,
            store,
            custodian,
        }
    }

    pub fn wallet(&self, lamports: u64) -> MemoryWallet {
        MemoryWallet::funded(&self.ledger, lamports)
    }

    pub fn pipeline(&self, wallet: Arc<MemoryWallet>) -> Pipeline {
        Pipeline::new(
            wallet,
            Arc::new(self.ledger.clone()),
            Arc::new(self.store.clone()),
            self.custodian.clone(),
            PROGRAM_ID,
        )
    }
}

/// Build, sign, and submit a single-instruction transaction.
pub async fn submit(
    fixture: &Fixture,
    wallet: &MemoryWallet,
    instruction: Instruction,
) -> Result<String, WalletError> {
    let blockhash = fixture
        .ledger
        .latest_blockhash()
        .await
        .map_err(WalletError::from)?;
    let envelope = TransactionEnvelope::for_instruction(instruction, &wallet.identity(), blockhash);
    wallet.submit_transaction(envelope).await
}

/// Register an asset for the wallet's identity. Returns the asset
/// address.
pub async fn register(
    fixture: &Fixture,
    wallet: &MemoryWallet,
    price: u64,
    content_id: &str,
) -> Result<Pubkey, WalletError> {
    let creator = wallet.identity();
    let (asset, _) = derive_asset_address(&PROGRAM_ID, &creator, content_id).unwrap();
    let instruction =
        codec::register_asset_instruction(&PROGRAM_ID, &creator, &asset, price, content_id)
            .unwrap();
    submit(fixture, wallet, instruction).await?;
    Ok(asset)
}

/// Purchase an entitlement on `asset`, paying `creator`. Returns the
/// entitlement address.
pub async fn purchase(
    fixture: &Fixture,
    wallet: &MemoryWallet,
    asset: &Pubkey,
    creator: &Pubkey,
) -> Result<Pubkey, WalletError> {
    let buyer = wallet.identity();
    let (entitlement, _) = derive_access_address(&PROGRAM_ID, asset, &buyer).unwrap();
    let instruction =
        codec::purchase_asset_instruction(&PROGRAM_ID, &buyer, &entitlement, asset, creator);
    submit(fixture, wallet, instruction).await?;
    Ok(entitlement)
}

/// Grant `grantee` an entitlement on `asset` without payment.
pub async fn grant(
    fixture: &Fixture,
    wallet: &MemoryWallet,
    asset: &Pubkey,
    grantee: &Pubkey,
) -> Result<Pubkey, WalletError> {
    let creator = wallet.identity();
    let (entitlement, _) = derive_access_address(&PROGRAM_ID, asset, grantee).unwrap();
    let instruction =
        codec::grant_access_instruction(&PROGRAM_ID, &creator, &entitlement, asset, grantee);
    submit(fixture, wallet, instruction).await?;
    Ok(entitlement)
}

/// The rejection reason inside a failed submission.
pub fn reject_reason(err: &WalletError) -> &RejectReason {
    match err {
        WalletError::Ledger(LedgerError::Rejected { reason, .. }) => reason,
        other => panic!("expected a ledger rejection, got: {other}"),
    }
}
