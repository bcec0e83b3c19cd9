//! Vault key management.
//!
//! Records are encrypted with a random vault key rather than the account
//! password directly:
//! Account Password → wraps → Vault Key → encrypts → record payloads
//!
//! The wrapped ("packed") form is stored on the server so that a second
//! device can recover the same vault key after logging in.

use crate::crypto::{cipher, CryptoError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a vault key in bytes.
pub const VAULT_KEY_LEN: usize = 32;

/// The key used as passphrase for every record payload.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; VAULT_KEY_LEN],
}

impl VaultKey {
    /// Generate a new random vault key
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; VAULT_KEY_LEN];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| CryptoError::RandomFailed(e.to_string()))?;
        Ok(Self { key })
    }

    /// Create a vault key from raw bytes
    pub fn from_bytes(key: [u8; VAULT_KEY_LEN]) -> Self {
        Self { key }
    }

    /// Get a reference to the key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; VAULT_KEY_LEN] {
        &self.key
    }

    /// Wrap this key with the account password for server-side storage.
    pub fn pack(&self, password: &str) -> Result<Vec<u8>> {
        cipher::encrypt(&self.key, password.as_bytes())
    }

    /// Recover a vault key from its packed form.
    pub fn unpack(packed: &[u8], password: &str) -> Result<Self> {
        let mut raw = cipher::decrypt(packed, password.as_bytes())?;
        if raw.len() != VAULT_KEY_LEN {
            let len = raw.len();
            raw.zeroize();
            return Err(CryptoError::DecryptionFailed(format!(
                "unpacked key has {} bytes",
                len
            )));
        }
        let mut key = [0u8; VAULT_KEY_LEN];
        key.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self { key })
    }

    /// Encrypt a record payload with this key.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        cipher::encrypt(plaintext, &self.key)
    }

    /// Decrypt a record payload sealed with this key.
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        cipher::decrypt(ciphertext, &self.key)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}
