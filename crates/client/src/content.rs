//! Symmetric content protection.
//!
//! Every asset gets a fresh AES-256-GCM key, never reused. The sealed
//! payload layout is `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! with a random nonce per encryption, so tampering with any byte makes
//! decryption fail closed instead of yielding altered plaintext.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("sealed payload is shorter than a nonce and tag")]
    Truncated,

    #[error("decryption authentication failed")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("key must be {KEY_LEN} bytes, got {0}")]
    WrongKeyLength(usize),

    #[error("key hex is malformed")]
    MalformedHex,
}

/// A per-asset symmetric key. Zeroed on drop; the raw bytes leave this
/// type only to be sealed with the key custodian or fed to the cipher.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_LEN]);

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

impl ContentKey {
    /// Generate a new random key using a cryptographically secure RNG.
    pub fn generate() -> Self {
        Self(Aes256Gcm::generate_key(&mut OsRng).into())
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, ContentError> {
        if data.len() != KEY_LEN {
            return Err(ContentError::WrongKeyLength(data.len()));
        }
        let mut buf = [0u8; KEY_LEN];
        buf.copy_from_slice(data);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex form used on the custodian wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, ContentError> {
        let bytes = hex::decode(s).map_err(|_| ContentError::MalformedHex)?;
        Self::from_slice(&bytes)
    }
}

/// Encrypt a payload under the given key with a fresh random nonce.
/// Output layout: `nonce || ciphertext || tag`.
pub fn encrypt(key: &ContentKey, plaintext: &[u8]) -> Result<Vec<u8>, ContentError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| ContentError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a sealed payload. Fails closed on any authentication
/// mismatch; no partial plaintext is ever returned.
pub fn decrypt(key: &ContentKey, sealed: &[u8]) -> Result<Vec<u8>, ContentError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(ContentError::Truncated);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ContentError::AuthenticationFailed)
}
