//! AES-256-CBC encryption and decryption for vault payloads.
//!
//! Uses AES-256-CBC with:
//! - 256-bit key derived from the passphrase (see [`crate::crypto::kdf`])
//! - 128-bit random IV, fresh for every call
//! - PKCS#7 padding
//!
//! Wire format: `iv(16) || ciphertext`

use crate::crypto::kdf::derive_key;
use crate::crypto::{CryptoError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size, which is also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext` with a key derived from `passphrase`.
///
/// Returns `iv || ciphertext`. Encrypting the same plaintext twice yields
/// different outputs because the IV is random.
pub fn encrypt(plaintext: &[u8], passphrase: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(passphrase);

    let mut iv = [0u8; BLOCK_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::RandomFailed(e.to_string()))?;

    let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::EncryptionFailed(format!(
            "padded buffer is not block aligned: {} bytes",
            ciphertext.len()
        )));
    }

    let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an `iv || ciphertext` buffer produced by [`encrypt`].
///
/// A wrong passphrase and corrupted data fail identically.
pub fn decrypt(data: &[u8], passphrase: &[u8]) -> Result<Vec<u8>> {
    if data.len() < BLOCK_SIZE * 2 {
        return Err(CryptoError::InvalidLength(data.len()));
    }

    let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidLength(data.len()));
    }

    let iv: [u8; BLOCK_SIZE] = iv
        .try_into()
        .map_err(|_| CryptoError::InvalidLength(data.len()))?;
    let key = derive_key(passphrase);

    Aes256CbcDec::new(key.as_bytes().into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("bad key or corrupted data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let plaintext = b"Hello, World! This is a test.";

        let encrypted = encrypt(plaintext, b"passphrase").unwrap();
        let decrypted = decrypt(&encrypted, b"passphrase").unwrap();

        assert_eq!(plaintext.to_vec(), decrypted);
    }

    #[test]
    fn output_is_iv_plus_whole_blocks() {
        let encrypted = encrypt(b"exactly16bytes!!", b"k").unwrap();
        // 16 bytes of plaintext pad to two blocks
        assert_eq!(encrypted.len(), BLOCK_SIZE + 2 * BLOCK_SIZE);

        let empty = encrypt(b"", b"k").unwrap();
        assert_eq!(empty.len(), BLOCK_SIZE * 2);
        assert!(decrypt(&empty, b"k").unwrap().is_empty());
    }

    #[test]
    fn different_ivs() {
        let e1 = encrypt(b"Same data", b"k").unwrap();
        let e2 = encrypt(b"Same data", b"k").unwrap();

        assert_ne!(e1[..BLOCK_SIZE], e2[..BLOCK_SIZE]);
        assert_ne!(e1, e2);
        assert_eq!(decrypt(&e1, b"k").unwrap(), decrypt(&e2, b"k").unwrap());
    }

    #[test]
    fn too_short_fails() {
        assert!(matches!(
            decrypt(&[0u8; 16], b"k"),
            Err(CryptoError::InvalidLength(16))
        ));
        assert!(matches!(
            decrypt(&[0u8; 31], b"k"),
            Err(CryptoError::InvalidLength(31))
        ));
    }

    #[test]
    fn unaligned_fails() {
        let mut encrypted = encrypt(b"some secret", b"k").unwrap();
        encrypted.push(0);
        assert!(matches!(
            decrypt(&encrypted, b"k"),
            Err(CryptoError::InvalidLength(_))
        ));
    }

    #[test]
    fn tampered_padding_fails() {
        let mut encrypted = encrypt(b"Original data", b"k").unwrap();
        let last = encrypted.len() - 1;
        // Flipping the IV-adjacent block breaks the final block's padding.
        encrypted[last - BLOCK_SIZE] ^= 0xFF;
        let result = decrypt(&encrypted, b"k");
        assert!(result.map(|p| p != b"Original data".to_vec()).unwrap_or(true));
    }

    proptest! {
        #[test]
        fn roundtrip_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..512),
                               pass in proptest::collection::vec(any::<u8>(), 0..64)) {
            let encrypted = encrypt(&data, &pass).unwrap();
            prop_assert_eq!(decrypt(&encrypted, &pass).unwrap(), data);
        }

        #[test]
        fn wrong_passphrase_never_returns_plaintext(
            data in proptest::collection::vec(any::<u8>(), 1..256),
        ) {
            let encrypted = encrypt(&data, b"right").unwrap();
            match decrypt(&encrypted, b"wrong") {
                Ok(other) => prop_assert_ne!(other, data),
                Err(_) => {}
            }
        }
    }
}
