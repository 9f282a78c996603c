//! Ledger access traits and the transaction envelope.
//!
//! Reads and submissions go through small capability traits so the
//! pipelines run identically against the JSON-RPC client and the
//! in-memory test ledger. Rejected transactions keep the host's
//! message and simulation logs verbatim; a rejection is never retried
//! automatically, since a misdiagnosed purchase retry could
//! double-charge.

use std::fmt;

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::hash::Hash;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::solana_program::message::Message;
use async_trait::async_trait;
use thiserror::Error;

/// Length of an ed25519 transaction signature.
pub const SIGNATURE_LEN: usize = 64;

/// Raw account contents as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccount {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Why the ledger rejected a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The account slot at a derived address is already occupied.
    AddressAlreadyInUse,
    /// The payer cannot cover the transfer plus fees and rent.
    InsufficientFunds,
    /// An instruction referenced an asset account that does not exist.
    AssetNotFound,
    /// The program raised one of its own error codes.
    Program { code: u32, name: String },
    /// Anything else the host reported.
    Other(String),
}

impl RejectReason {
    /// Classify a rejection from its message and simulation logs. The
    /// patterns follow the host runtime's and the program's log
    /// formats.
    pub fn classify(message: &str, logs: &[String]) -> Self {
        let mut haystack = message.to_string();
        for line in logs {
            haystack.push('\n');
            haystack.push_str(line);
        }
        if haystack.contains("already in use") {
            return RejectReason::AddressAlreadyInUse;
        }
        // The runtime spells balance shortfalls differently per path,
        // e.g. "Transfer: insufficient lamports" vs "Insufficient funds
        // for fee".
        let lowered = haystack.to_lowercase();
        if lowered.contains("insufficient lamports") || lowered.contains("insufficient funds") {
            return RejectReason::InsufficientFunds;
        }
        if let Some(reason) = parse_program_error(&haystack) {
            return reason;
        }
        RejectReason::Other(message.to_string())
    }
}

/// Parse "Error Code: <Name>. Error Number: <code>." program log lines.
fn parse_program_error(haystack: &str) -> Option<RejectReason> {
    let rest = &haystack[haystack.find("Error Code: ")? + "Error Code: ".len()..];
    let name = rest.split('.').next()?.trim().to_string();
    let rest = &rest[rest.find("Error Number: ")? + "Error Number: ".len()..];
    let code: u32 = rest.split('.').next()?.trim().parse().ok()?;
    // The account layer reports an unregistered asset as a
    // not-initialized account.
    if name == "AccountNotInitialized" {
        return Some(RejectReason::AssetNotFound);
    }
    Some(RejectReason::Program { code, name })
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::AddressAlreadyInUse => f.write_str("address already in use"),
            RejectReason::InsufficientFunds => f.write_str("insufficient funds"),
            RejectReason::AssetNotFound => f.write_str("asset not found"),
            RejectReason::Program { code, name } => write!(f, "program error {name} ({code})"),
            RejectReason::Other(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction rejected: {reason}")]
    Rejected {
        reason: RejectReason,
        message: String,
        logs: Vec<String>,
    },

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("transaction is not signed")]
    Unsigned,

    #[error("ledger transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Rejection reason, if this error is a rejection.
    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            LedgerError::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Read side of the ledger.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Account at the address, or None if the slot is vacant.
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<RawAccount>, LedgerError>;

    /// Lamport balance of the address; vacant addresses hold zero.
    async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError>;

    /// A recent blockhash for transaction construction.
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;
}

/// Submit side of the ledger.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Submit a signed transaction wire. Returns the node's signature
    /// string for the transaction.
    async fn send_transaction(&self, wire: &[u8]) -> Result<String, LedgerError>;
}

/// A single-signer legacy transaction under construction.
#[derive(Debug, Clone)]
pub struct TransactionEnvelope {
    pub payer: Pubkey,
    /// Serialized legacy message, the exact bytes the signature covers.
    pub message: Vec<u8>,
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

impl TransactionEnvelope {
    /// Build an envelope around one instruction, fee paid by `payer`.
    pub fn for_instruction(instruction: Instruction, payer: &Pubkey, blockhash: Hash) -> Self {
        let mut message = Message::new(&[instruction], Some(payer));
        message.recent_blockhash = blockhash;
        Self {
            payer: *payer,
            message: message.serialize(),
            signature: None,
        }
    }

    /// The bytes a wallet signs.
    pub fn signing_payload(&self) -> &[u8] {
        &self.message
    }

    pub fn attach_signature(&mut self, signature: [u8; SIGNATURE_LEN]) {
        self.signature = Some(signature);
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Wire layout for a single-signer transaction:
    /// signature count (1) || signature (64) || message bytes.
    pub fn to_wire(&self) -> Result<Vec<u8>, LedgerError> {
        let signature = self.signature.ok_or(LedgerError::Unsigned)?;
        let mut wire = Vec::with_capacity(1 + SIGNATURE_LEN + self.message.len());
        wire.push(1);
        wire.extend_from_slice(&signature);
        wire.extend_from_slice(&self.message);
        Ok(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::config::PROGRAM_ID;

    #[test]
    fn classify_allocation_conflict() {
        let logs = vec![
            "Allocate: account Address { address: 7nE..., base: None } already in use"
                .to_string(),
            "Program 11111111111111111111111111111111 failed: custom program error: 0x0"
                .to_string(),
        ];
        assert_eq!(
            RejectReason::classify("Transaction simulation failed", &logs),
            RejectReason::AddressAlreadyInUse
        );
    }

    #[test]
    fn classify_insufficient_lamports() {
        let logs =
            vec!["Transfer: insufficient lamports 350, need 1000000000".to_string()];
        assert_eq!(
            RejectReason::classify("Transaction simulation failed", &logs),
            RejectReason::InsufficientFunds
        );
    }

    #[test]
    fn classify_fee_shortfall() {
        assert_eq!(
            RejectReason::classify(
                "Transaction simulation failed: Insufficient funds for fee",
                &[]
            ),
            RejectReason::InsufficientFunds
        );
    }

    #[test]
    fn classify_program_error_line() {
        let logs = vec![
            "Program log: AnchorError thrown in programs/sealgate/src/instructions/purchase_asset.rs. \
             Error Code: OwnerMismatch. Error Number: 6001. Error Message: Recipient account \
             does not match the asset owner."
                .to_string(),
        ];
        assert_eq!(
            RejectReason::classify("Transaction simulation failed", &logs),
            RejectReason::Program {
                code: 6001,
                name: "OwnerMismatch".to_string()
            }
        );
    }

    #[test]
    fn classify_uninitialized_asset_as_not_found() {
        let logs = vec![
            "Program log: AnchorError caused by account: asset. Error Code: \
             AccountNotInitialized. Error Number: 3012. Error Message: The program expected \
             this account to be already initialized."
                .to_string(),
        ];
        assert_eq!(
            RejectReason::classify("Transaction simulation failed", &logs),
            RejectReason::AssetNotFound
        );
    }

    #[test]
    fn classify_falls_back_to_message() {
        assert_eq!(
            RejectReason::classify("Blockhash not found", &[]),
            RejectReason::Other("Blockhash not found".to_string())
        );
    }

    #[test]
    fn unsigned_envelope_cannot_hit_the_wire() {
        let payer = Pubkey::new_unique();
        let instruction = codec::purchase_asset_instruction(
            &PROGRAM_ID,
            &payer,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        );
        let envelope =
            TransactionEnvelope::for_instruction(instruction, &payer, Hash::default());
        assert!(matches!(envelope.to_wire(), Err(LedgerError::Unsigned)));
    }

    #[test]
    fn wire_layout_is_count_signature_message() {
        let payer = Pubkey::new_unique();
        let instruction = codec::purchase_asset_instruction(
            &PROGRAM_ID,
            &payer,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        );
        let mut envelope =
            TransactionEnvelope::for_instruction(instruction, &payer, Hash::default());
        envelope.attach_signature([7u8; SIGNATURE_LEN]);
        let wire = envelope.to_wire().unwrap();

        assert_eq!(wire[0], 1);
        assert_eq!(wire[1..1 + SIGNATURE_LEN], [7u8; SIGNATURE_LEN]);
        assert_eq!(&wire[1 + SIGNATURE_LEN..], envelope.message.as_slice());

        let message: Message = bincode::deserialize(&envelope.message).unwrap();
        assert_eq!(message.account_keys[0], payer);
        assert_eq!(message.header.num_required_signatures, 1);
    }
}
