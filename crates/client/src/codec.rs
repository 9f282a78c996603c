//! Wire encoding for program instructions and account data.
//!
//! Every instruction serializes as an 8-byte discriminator followed by
//! its arguments; numeric fields are little-endian, strings carry a
//! 4-byte little-endian length prefix. Account data read back from the
//! ledger uses the same discriminator convention, checked before any
//! field is parsed. This module is the only encoder in the crate; the
//! unit tests hold it byte-for-byte equal to what the program itself
//! generates, so the two can never drift apart.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::system_program;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Byte budget for the content id stored on an asset account.
pub const MAX_CONTENT_ID_LEN: usize = 64;

/// Allocated size of an asset account.
/// Discriminator (8) + Pubkey (32) + u64 (8) + String (4 + 64) + u8 (1)
pub const ASSET_SPACE: usize = 8 + 32 + 8 + 4 + MAX_CONTENT_ID_LEN + 1;

/// Allocated size of an entitlement account.
/// Discriminator (8) + Pubkey (32) + Pubkey (32) + u8 (1)
pub const ENTITLEMENT_SPACE: usize = 8 + 32 + 32 + 1;

/// sha256("global:register_asset")[0..8]
pub const REGISTER_ASSET_DISCRIMINATOR: [u8; 8] = [21, 80, 155, 149, 117, 207, 235, 16];

/// sha256("global:purchase_asset")[0..8]
pub const PURCHASE_ASSET_DISCRIMINATOR: [u8; 8] = [141, 216, 187, 174, 119, 200, 123, 167];

/// sha256("global:grant_access")[0..8]
pub const GRANT_ACCESS_DISCRIMINATOR: [u8; 8] = [66, 88, 87, 113, 39, 22, 27, 165];

/// sha256("account:Asset")[0..8]
pub const ASSET_DISCRIMINATOR: [u8; 8] = [234, 180, 241, 252, 139, 224, 160, 8];

/// sha256("account:Entitlement")[0..8]
pub const ENTITLEMENT_DISCRIMINATOR: [u8; 8] = [220, 250, 27, 244, 55, 49, 74, 154];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("account discriminator does not match any known schema")]
    UnknownAccountType,

    #[error("instruction discriminator does not match any known instruction")]
    UnknownInstruction,

    #[error("data ends before the {0} field")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),

    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    #[error("content id is {len} bytes, limit is {MAX_CONTENT_ID_LEN}")]
    ContentIdTooLong { len: usize },
}

/// Discriminator for an instruction with the given snake_case name.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    discriminator("global", name)
}

/// Discriminator for an account type with the given struct name.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    discriminator("account", name)
}

fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

// ---- instruction data ----

pub fn encode_register_asset(price: u64, content_id: &str) -> Result<Vec<u8>, CodecError> {
    if content_id.len() > MAX_CONTENT_ID_LEN {
        return Err(CodecError::ContentIdTooLong {
            len: content_id.len(),
        });
    }
    let mut data = Vec::with_capacity(8 + 8 + 4 + content_id.len());
    data.extend_from_slice(&REGISTER_ASSET_DISCRIMINATOR);
    data.extend_from_slice(&price.to_le_bytes());
    data.extend_from_slice(&(content_id.len() as u32).to_le_bytes());
    data.extend_from_slice(content_id.as_bytes());
    Ok(data)
}

pub fn decode_register_asset(data: &[u8]) -> Result<(u64, String), CodecError> {
    let mut reader = Reader::new(data);
    if reader.take(8, "discriminator")? != REGISTER_ASSET_DISCRIMINATOR {
        return Err(CodecError::UnknownInstruction);
    }
    let price = reader.read_u64("price")?;
    let content_id = reader.read_string("content_id")?;
    reader.finish()?;
    Ok((price, content_id))
}

pub fn encode_purchase_asset() -> Vec<u8> {
    PURCHASE_ASSET_DISCRIMINATOR.to_vec()
}

pub fn encode_grant_access() -> Vec<u8> {
    GRANT_ACCESS_DISCRIMINATOR.to_vec()
}

// ---- account metas ----

/// Accounts for register_asset, in program order.
pub fn register_asset_metas(creator: &Pubkey, asset: &Pubkey) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(*creator, true),
        AccountMeta::new(*asset, false),
        AccountMeta::new_readonly(system_program::ID, false),
    ]
}

/// Accounts for purchase_asset, in program order.
pub fn purchase_asset_metas(
    buyer: &Pubkey,
    entitlement: &Pubkey,
    asset: &Pubkey,
    creator: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(*buyer, true),
        AccountMeta::new(*entitlement, false),
        AccountMeta::new_readonly(*asset, false),
        AccountMeta::new(*creator, false),
        AccountMeta::new_readonly(system_program::ID, false),
    ]
}

/// Accounts for grant_access, in program order.
pub fn grant_access_metas(
    creator: &Pubkey,
    entitlement: &Pubkey,
    asset: &Pubkey,
    grantee: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(*creator, true),
        AccountMeta::new(*entitlement, false),
        AccountMeta::new_readonly(*asset, false),
        AccountMeta::new_readonly(*grantee, false),
        AccountMeta::new_readonly(system_program::ID, false),
    ]
}

// ---- full instructions ----

pub fn register_asset_instruction(
    program_id: &Pubkey,
    creator: &Pubkey,
    asset: &Pubkey,
    price: u64,
    content_id: &str,
) -> Result<Instruction, CodecError> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: register_asset_metas(creator, asset),
        data: encode_register_asset(price, content_id)?,
    })
}

pub fn purchase_asset_instruction(
    program_id: &Pubkey,
    buyer: &Pubkey,
    entitlement: &Pubkey,
    asset: &Pubkey,
    creator: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: purchase_asset_metas(buyer, entitlement, asset, creator),
        data: encode_purchase_asset(),
    }
}

pub fn grant_access_instruction(
    program_id: &Pubkey,
    creator: &Pubkey,
    entitlement: &Pubkey,
    asset: &Pubkey,
    grantee: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: grant_access_metas(creator, entitlement, asset, grantee),
        data: encode_grant_access(),
    }
}

// ---- account data ----

/// Decoded asset account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAccount {
    pub owner: Pubkey,
    pub price: u64,
    pub content_id: String,
    pub bump: u8,
}

/// Decoded entitlement account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementAccount {
    pub asset: Pubkey,
    pub grantee: Pubkey,
    pub bump: u8,
}

/// Parse an asset account. The discriminator is verified before any
/// field is read; trailing bytes are allowed because on-chain accounts
/// are allocated at a fixed size and zero-padded past the payload.
pub fn decode_asset(data: &[u8]) -> Result<AssetAccount, CodecError> {
    let mut reader = Reader::for_account(data, &ASSET_DISCRIMINATOR)?;
    Ok(AssetAccount {
        owner: reader.read_pubkey("owner")?,
        price: reader.read_u64("price")?,
        content_id: reader.read_string("content_id")?,
        bump: reader.read_u8("bump")?,
    })
}

/// Parse an entitlement account, discriminator checked first.
pub fn decode_entitlement(data: &[u8]) -> Result<EntitlementAccount, CodecError> {
    let mut reader = Reader::for_account(data, &ENTITLEMENT_DISCRIMINATOR)?;
    Ok(EntitlementAccount {
        asset: reader.read_pubkey("asset")?,
        grantee: reader.read_pubkey("grantee")?,
        bump: reader.read_u8("bump")?,
    })
}

/// Serialize an asset account payload, without allocation padding.
pub fn encode_asset(account: &AssetAccount) -> Result<Vec<u8>, CodecError> {
    if account.content_id.len() > MAX_CONTENT_ID_LEN {
        return Err(CodecError::ContentIdTooLong {
            len: account.content_id.len(),
        });
    }
    let mut data = Vec::with_capacity(ASSET_SPACE);
    data.extend_from_slice(&ASSET_DISCRIMINATOR);
    data.extend_from_slice(account.owner.as_ref());
    data.extend_from_slice(&account.price.to_le_bytes());
    data.extend_from_slice(&(account.content_id.len() as u32).to_le_bytes());
    data.extend_from_slice(account.content_id.as_bytes());
    data.push(account.bump);
    Ok(data)
}

/// Serialize an entitlement account payload.
pub fn encode_entitlement(account: &EntitlementAccount) -> Vec<u8> {
    let mut data = Vec::with_capacity(ENTITLEMENT_SPACE);
    data.extend_from_slice(&ENTITLEMENT_DISCRIMINATOR);
    data.extend_from_slice(account.asset.as_ref());
    data.extend_from_slice(account.grantee.as_ref());
    data.push(account.bump);
    data
}

// ---- byte cursor ----

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Cursor positioned past a verified account discriminator.
    fn for_account(data: &'a [u8], expected: &[u8; 8]) -> Result<Self, CodecError> {
        if data.len() < 8 || data[..8] != expected[..] {
            return Err(CodecError::UnknownAccountType);
        }
        Ok(Self { data, pos: 8 })
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.data.len() - self.pos < len {
            return Err(CodecError::Truncated(field));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let bytes = self.take(8, field)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_pubkey(&mut self, field: &'static str) -> Result<Pubkey, CodecError> {
        let bytes = self.take(32, field)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(bytes);
        Ok(Pubkey::new_from_array(buf))
    }

    fn read_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len_bytes = self.take(4, field)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(len_bytes);
        let len = u32::from_le_bytes(buf) as usize;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reject leftover bytes; instruction arguments are exact.
    fn finish(&self) -> Result<(), CodecError> {
        let remaining = self.data.len() - self.pos;
        if remaining > 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
