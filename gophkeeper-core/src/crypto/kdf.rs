//! Passphrase to cipher key derivation.
//!
//! The payload cipher takes a 256-bit key. Passphrases of any length are
//! mapped onto that key space with a single SHA-256 pass.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length in bytes of a derived cipher key.
pub const KEY_LEN: usize = 32;

/// A derived AES-256 key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LEN],
}

impl CipherKey {
    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Derive a fixed-length cipher key from an arbitrary passphrase.
pub fn derive_key(passphrase: &[u8]) -> CipherKey {
    let mut digest = Sha256::digest(passphrase);
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    CipherKey { key }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_passphrase_same_key() {
        let k1 = derive_key(b"correct horse");
        let k2 = derive_key(b"correct horse");
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_passphrase_different_key() {
        let k1 = derive_key(b"correct horse");
        let k2 = derive_key(b"battery staple");
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn empty_passphrase_still_yields_full_key() {
        assert_eq!(derive_key(b"").as_bytes().len(), KEY_LEN);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = derive_key(b"secret");
        assert_eq!(format!("{:?}", key), "CipherKey(..)");
    }
}
