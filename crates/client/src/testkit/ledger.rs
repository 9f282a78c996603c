//! In-memory ledger executing this program's transactions.
//!
//! The model reproduces what a client observes against a real node:
//! account creation at derived addresses with rent debits, a flat fee
//! per signature, occupied-address and constraint rejections in the
//! order the deployed program checks them, and rejection logs in the
//! runtime's format so [`RejectReason::classify`] sees the same text it
//! would parse in production. Submissions behave like preflight
//! simulation: a rejected transaction changes nothing and costs
//! nothing.

use std::collections::HashMap;
use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::hash::{hashv, Hash};
use anchor_lang::solana_program::message::Message;
use anchor_lang::solana_program::system_program;
use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use parking_lot::Mutex;

use crate::codec::{
    self, AssetAccount, EntitlementAccount, ASSET_SPACE, ENTITLEMENT_SPACE,
    GRANT_ACCESS_DISCRIMINATOR, MAX_CONTENT_ID_LEN, PURCHASE_ASSET_DISCRIMINATOR,
    REGISTER_ASSET_DISCRIMINATOR,
};
use crate::derive::{derive_access_address, derive_asset_address};
use crate::ledger::{
    LedgerError, LedgerReader, LedgerWriter, RawAccount, RejectReason, SIGNATURE_LEN,
};

/// Flat fee charged per transaction signature.
pub const TX_FEE: u64 = 5_000;

/// Lamports an account of the given size must hold to stay alive.
pub fn rent_exempt_minimum(space: usize) -> u64 {
    // (account overhead + data length) * lamports per byte-year * 2 years
    (128 + space as u64) * 3_480 * 2
}

#[derive(Debug, Clone, Default)]
struct StoredAccount {
    lamports: u64,
    owner: Pubkey,
    data: Vec<u8>,
}

struct LedgerState {
    accounts: HashMap<Pubkey, StoredAccount>,
    slot: u64,
    fail_next: Option<String>,
}

/// Shared in-memory ledger. Clones share the same state, so a wallet
/// and the assertions in a test observe the same accounts.
#[derive(Clone)]
pub struct MemoryLedger {
    program_id: Pubkey,
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            state: Arc::new(Mutex::new(LedgerState {
                accounts: HashMap::new(),
                slot: 0,
                fail_next: None,
            })),
        }
    }

    pub fn airdrop(&self, address: &Pubkey, lamports: u64) {
        let mut state = self.state.lock();
        state.accounts.entry(*address).or_default().lamports += lamports;
    }

    /// Current balance, zero for vacant addresses. Synchronous
    /// convenience for assertions.
    pub fn lamports(&self, address: &Pubkey) -> u64 {
        self.state
            .lock()
            .accounts
            .get(address)
            .map_or(0, |account| account.lamports)
    }

    pub fn account_data(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.state
            .lock()
            .accounts
            .get(address)
            .map(|account| account.data.clone())
    }

    /// Plant an account verbatim, bypassing execution. For fixtures
    /// that need corrupt or hand-built records.
    pub fn set_account_raw(&self, address: Pubkey, account: RawAccount) {
        self.state.lock().accounts.insert(
            address,
            StoredAccount {
                lamports: account.lamports,
                owner: account.owner,
                data: account.data,
            },
        );
    }

    /// Make the next submission fail with the given message.
    pub fn fail_next_submit(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    fn execute(&self, wire: &[u8]) -> Result<String, LedgerError> {
        if wire.len() < 1 + SIGNATURE_LEN || wire[0] != 1 {
            return Err(LedgerError::InvalidResponse(
                "transaction wire is not a single-signer envelope".to_string(),
            ));
        }
        let signature: [u8; SIGNATURE_LEN] = wire[1..1 + SIGNATURE_LEN]
            .try_into()
            .map_err(|_| LedgerError::InvalidResponse("signature bytes".to_string()))?;
        let message_bytes = &wire[1 + SIGNATURE_LEN..];
        let message: Message = bincode::deserialize(message_bytes)
            .map_err(|e| LedgerError::InvalidResponse(format!("transaction message: {e}")))?;
        let payer = *message
            .account_keys
            .first()
            .ok_or_else(|| LedgerError::InvalidResponse("empty account keys".to_string()))?;
        if message.header.num_required_signatures != 1 {
            return Err(LedgerError::InvalidResponse(
                "expected exactly one required signature".to_string(),
            ));
        }

        let verifying_key = VerifyingKey::from_bytes(&payer.to_bytes())
            .map_err(|_| reject("Transaction signature verification failure".to_string(), vec![]))?;
        verifying_key
            .verify(message_bytes, &Signature::from_bytes(&signature))
            .map_err(|_| reject("Transaction signature verification failure".to_string(), vec![]))?;

        let mut state = self.state.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(reject(message, vec![]));
        }

        // Work on a copy; a failed instruction discards every effect.
        let mut accounts = state.accounts.clone();

        // One flat fee per signature, charged before execution.
        let fee_balance = accounts.get(&payer).map_or(0, |account| account.lamports);
        if fee_balance < TX_FEE {
            return Err(reject(
                "Transaction simulation failed: Insufficient funds for fee".to_string(),
                vec![],
            ));
        }
        accounts.entry(payer).or_default().lamports = fee_balance - TX_FEE;

        for (index, instruction) in message.instructions.iter().enumerate() {
            let program = *resolve(&message.account_keys, instruction.program_id_index)?;
            if program != self.program_id {
                return Err(reject(
                    format!("Transaction contains an instruction for unsupported program {program}"),
                    vec![],
                ));
            }
            let mut metas = Vec::with_capacity(instruction.accounts.len());
            for &account_index in &instruction.accounts {
                metas.push(*resolve(&message.account_keys, account_index)?);
            }
            self.process_instruction(&mut accounts, index, &payer, &metas, &instruction.data)?;
        }
        state.accounts = accounts;

        Ok(hex::encode(signature))
    }

    fn process_instruction(
        &self,
        accounts: &mut HashMap<Pubkey, StoredAccount>,
        index: usize,
        payer: &Pubkey,
        metas: &[Pubkey],
        data: &[u8],
    ) -> Result<(), LedgerError> {
        if data.len() < 8 {
            return Err(anchor_reject(
                self.program_id,
                index,
                None,
                "InstructionDidNotDeserialize",
                102,
                "The program could not deserialize the given instruction",
            ));
        }
        match data[..8].try_into() {
            Ok(REGISTER_ASSET_DISCRIMINATOR) => {
                self.process_register(accounts, index, payer, metas, data)
            }
            Ok(PURCHASE_ASSET_DISCRIMINATOR) => {
                self.process_purchase(accounts, index, payer, metas)
            }
            Ok(GRANT_ACCESS_DISCRIMINATOR) => self.process_grant(accounts, index, payer, metas),
            _ => Err(anchor_reject(
                self.program_id,
                index,
                None,
                "InstructionFallbackNotFound",
                101,
                "Fallback functions are not supported",
            )),
        }
    }

    fn process_register(
        &self,
        accounts: &mut HashMap<Pubkey, StoredAccount>,
        index: usize,
        payer: &Pubkey,
        metas: &[Pubkey],
        data: &[u8],
    ) -> Result<(), LedgerError> {
        // Argument deserialization precedes account validation.
        let (price, content_id) = codec::decode_register_asset(data).map_err(|_| {
            anchor_reject(
                self.program_id,
                index,
                None,
                "InstructionDidNotDeserialize",
                102,
                "The program could not deserialize the given instruction",
            )
        })?;
        let [creator, asset_address, system] = expect_metas(self.program_id, index, metas)?;

        // Extraction pass: typed account checks in declaration order.
        require_signer(self.program_id, index, "creator", &creator, payer)?;
        require_system_program(self.program_id, index, &system)?;

        // Constraint pass: the asset account is created here.
        let (expected, bump) = derive_asset_address(&self.program_id, &creator, &content_id)
            .map_err(|_| seeds_violation(self.program_id, index, "asset"))?;
        if expected != asset_address {
            return Err(seeds_violation(self.program_id, index, "asset"));
        }
        let rent = rent_exempt_minimum(ASSET_SPACE);
        let mut available = balance_of(accounts, &creator);
        create_account(index, accounts, &mut available, asset_address, rent)?;

        // Handler body: length gate, then the record is written.
        if content_id.len() > MAX_CONTENT_ID_LEN {
            return Err(anchor_reject(
                self.program_id,
                index,
                None,
                "InvalidContentIdLength",
                6000,
                "Content id exceeds the stored length budget",
            ));
        }
        let record = AssetAccount {
            owner: creator,
            price,
            content_id,
            bump,
        };
        let mut data = codec::encode_asset(&record)
            .map_err(|e| LedgerError::InvalidResponse(format!("asset payload: {e}")))?;
        data.resize(ASSET_SPACE, 0);
        settle(accounts, &creator, available);
        write_account(accounts, asset_address, self.program_id, rent, data);
        Ok(())
    }

    fn process_purchase(
        &self,
        accounts: &mut HashMap<Pubkey, StoredAccount>,
        index: usize,
        payer: &Pubkey,
        metas: &[Pubkey],
    ) -> Result<(), LedgerError> {
        let [buyer, entitlement_address, asset_address, creator, system] =
            expect_metas(self.program_id, index, metas)?;

        // Extraction pass: the asset record is read and decoded during
        // typed extraction, so an unregistered asset dies here.
        require_signer(self.program_id, index, "buyer", &buyer, payer)?;
        let asset = self.read_asset(accounts, index, &asset_address)?;
        require_system_program(self.program_id, index, &system)?;

        // Constraint pass: the entitlement account is created before
        // the handler runs, so a repeat purchase dies on the occupied
        // address without the price ever moving.
        let (expected, bump) = derive_access_address(&self.program_id, &asset_address, &buyer)
            .map_err(|_| seeds_violation(self.program_id, index, "entitlement"))?;
        if expected != entitlement_address {
            return Err(seeds_violation(self.program_id, index, "entitlement"));
        }
        let rent = rent_exempt_minimum(ENTITLEMENT_SPACE);
        let mut available = balance_of(accounts, &buyer);
        create_account(index, accounts, &mut available, entitlement_address, rent)?;

        // Handler body: owner gate, then the price transfer.
        if asset.owner != creator {
            return Err(anchor_reject(
                self.program_id,
                index,
                None,
                "OwnerMismatch",
                6001,
                "Recipient account does not match the asset owner",
            ));
        }
        if available < asset.price {
            return Err(insufficient_lamports(index, available, asset.price));
        }
        available -= asset.price;

        settle(accounts, &buyer, available);
        accounts.entry(creator).or_default().lamports += asset.price;
        let record = EntitlementAccount {
            asset: asset_address,
            grantee: buyer,
            bump,
        };
        write_account(
            accounts,
            entitlement_address,
            self.program_id,
            rent,
            codec::encode_entitlement(&record),
        );
        Ok(())
    }

    fn process_grant(
        &self,
        accounts: &mut HashMap<Pubkey, StoredAccount>,
        index: usize,
        payer: &Pubkey,
        metas: &[Pubkey],
    ) -> Result<(), LedgerError> {
        let [creator, entitlement_address, asset_address, grantee, system] =
            expect_metas(self.program_id, index, metas)?;

        require_signer(self.program_id, index, "creator", &creator, payer)?;
        let asset = self.read_asset(accounts, index, &asset_address)?;
        require_system_program(self.program_id, index, &system)?;

        let (expected, bump) = derive_access_address(&self.program_id, &asset_address, &grantee)
            .map_err(|_| seeds_violation(self.program_id, index, "entitlement"))?;
        if expected != entitlement_address {
            return Err(seeds_violation(self.program_id, index, "entitlement"));
        }
        let rent = rent_exempt_minimum(ENTITLEMENT_SPACE);
        let mut available = balance_of(accounts, &creator);
        create_account(index, accounts, &mut available, entitlement_address, rent)?;

        if asset.owner != creator {
            return Err(anchor_reject(
                self.program_id,
                index,
                None,
                "Unauthorized",
                6002,
                "Unauthorized",
            ));
        }

        settle(accounts, &creator, available);
        let record = EntitlementAccount {
            asset: asset_address,
            grantee,
            bump,
        };
        write_account(
            accounts,
            entitlement_address,
            self.program_id,
            rent,
            codec::encode_entitlement(&record),
        );
        Ok(())
    }

    fn read_asset(
        &self,
        accounts: &HashMap<Pubkey, StoredAccount>,
        index: usize,
        address: &Pubkey,
    ) -> Result<AssetAccount, LedgerError> {
        let stored = accounts.get(address).ok_or_else(|| {
            anchor_reject(
                self.program_id,
                index,
                Some("asset"),
                "AccountNotInitialized",
                3012,
                "The program expected this account to be already initialized",
            )
        })?;
        if stored.owner != self.program_id {
            return Err(anchor_reject(
                self.program_id,
                index,
                Some("asset"),
                "AccountOwnedByWrongProgram",
                3007,
                "The given account is owned by a different program than expected",
            ));
        }
        codec::decode_asset(&stored.data).map_err(|_| {
            anchor_reject(
                self.program_id,
                index,
                Some("asset"),
                "AccountDiscriminatorMismatch",
                3002,
                "8 byte discriminator did not match what was expected",
            )
        })
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<RawAccount>, LedgerError> {
        Ok(self.state.lock().accounts.get(address).map(|account| RawAccount {
            lamports: account.lamports,
            owner: account.owner,
            data: account.data.clone(),
        }))
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self.lamports(address))
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        let mut state = self.state.lock();
        state.slot += 1;
        Ok(hashv(&[b"memory-ledger", &state.slot.to_le_bytes()]))
    }
}

#[async_trait]
impl LedgerWriter for MemoryLedger {
    async fn send_transaction(&self, wire: &[u8]) -> Result<String, LedgerError> {
        self.execute(wire)
    }
}

fn resolve(keys: &[Pubkey], index: u8) -> Result<&Pubkey, LedgerError> {
    keys.get(index as usize)
        .ok_or_else(|| LedgerError::InvalidResponse("account index out of range".to_string()))
}

fn expect_metas<const N: usize>(
    program_id: Pubkey,
    index: usize,
    metas: &[Pubkey],
) -> Result<[Pubkey; N], LedgerError> {
    <[Pubkey; N]>::try_from(metas.to_vec()).map_err(|_| {
        anchor_reject(
            program_id,
            index,
            None,
            "AccountNotEnoughKeys",
            3005,
            "Not enough account keys given to the instruction",
        )
    })
}

fn require_signer(
    program_id: Pubkey,
    index: usize,
    name: &str,
    account: &Pubkey,
    payer: &Pubkey,
) -> Result<(), LedgerError> {
    if account != payer {
        return Err(anchor_reject(
            program_id,
            index,
            Some(name),
            "AccountNotSigner",
            3010,
            "The given account did not sign",
        ));
    }
    Ok(())
}

fn require_system_program(
    program_id: Pubkey,
    index: usize,
    account: &Pubkey,
) -> Result<(), LedgerError> {
    if *account != system_program::ID {
        return Err(anchor_reject(
            program_id,
            index,
            Some("system_program"),
            "InvalidProgramId",
            3008,
            "Program ID was not as expected",
        ));
    }
    Ok(())
}

/// Payer balance in the working copy, zero when the slot is vacant.
fn balance_of(accounts: &HashMap<Pubkey, StoredAccount>, payer: &Pubkey) -> u64 {
    accounts.get(payer).map_or(0, |account| account.lamports)
}

/// Reserve rent for a new account at `address`, failing if the slot is
/// occupied or `available` cannot cover it.
fn create_account(
    index: usize,
    accounts: &HashMap<Pubkey, StoredAccount>,
    available: &mut u64,
    address: Pubkey,
    rent: u64,
) -> Result<(), LedgerError> {
    if accounts.get(&address).is_some_and(|a| a.lamports > 0 || !a.data.is_empty()) {
        let logs = vec![
            format!("Allocate: account Address {{ address: {address}, base: None }} already in use"),
            "Program 11111111111111111111111111111111 failed: custom program error: 0x0"
                .to_string(),
        ];
        let message = format!(
            "Transaction simulation failed: Error processing Instruction {index}: custom program error: 0x0"
        );
        return Err(reject(message, logs));
    }
    if *available < rent {
        return Err(insufficient_lamports(index, *available, rent));
    }
    *available -= rent;
    Ok(())
}

fn settle(accounts: &mut HashMap<Pubkey, StoredAccount>, payer: &Pubkey, remaining: u64) {
    accounts.entry(*payer).or_default().lamports = remaining;
}

fn write_account(
    accounts: &mut HashMap<Pubkey, StoredAccount>,
    address: Pubkey,
    owner: Pubkey,
    lamports: u64,
    data: Vec<u8>,
) {
    accounts.insert(
        address,
        StoredAccount {
            lamports,
            owner,
            data,
        },
    );
}

fn reject(message: String, logs: Vec<String>) -> LedgerError {
    let reason = RejectReason::classify(&message, &logs);
    LedgerError::Rejected {
        reason,
        message,
        logs,
    }
}

fn seeds_violation(program_id: Pubkey, index: usize, account: &str) -> LedgerError {
    anchor_reject(
        program_id,
        index,
        Some(account),
        "ConstraintSeeds",
        2006,
        "A seeds constraint was violated",
    )
}

fn insufficient_lamports(index: usize, have: u64, need: u64) -> LedgerError {
    let logs = vec![format!("Transfer: insufficient lamports {have}, need {need}")];
    let message = format!(
        "Transaction simulation failed: Error processing Instruction {index}: custom program error: 0x1"
    );
    reject(message, logs)
}

fn anchor_reject(
    program_id: Pubkey,
    index: usize,
    account: Option<&str>,
    name: &str,
    code: u32,
    error_message: &str,
) -> LedgerError {
    let source = match account {
        Some(account) => format!("AnchorError caused by account: {account}."),
        None => "AnchorError occurred.".to_string(),
    };
    let logs = vec![
        format!(
            "Program log: {source} Error Code: {name}. Error Number: {code}. Error Message: {error_message}."
        ),
        format!("Program {program_id} failed: custom program error: {code:#x}"),
    ];
    let message = format!(
        "Transaction simulation failed: Error processing Instruction {index}: custom program error: {code:#x}"
    );
    reject(message, logs)
}
