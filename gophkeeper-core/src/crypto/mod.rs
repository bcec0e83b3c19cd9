//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - SHA-256 passphrase key derivation
//! - AES-256-CBC payload encryption with PKCS#7 padding
//! - Argon2id account password hashing
//! - Vault key generation and wrapping

pub mod cipher;
pub mod kdf;
pub mod keyring;
pub mod password;

pub use cipher::{decrypt, encrypt};
pub use kdf::{derive_key, CipherKey};
pub use keyring::VaultKey;
pub use password::{hash_password, hash_password_with, verify_password, PasswordHashParams};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Wrong key and corrupted data deliberately share this variant and message.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid ciphertext length: {0} bytes")]
    InvalidLength(usize),

    #[error("Password hashing failed: {0}")]
    HashFailed(String),

    #[error("Random number generation failed: {0}")]
    RandomFailed(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
